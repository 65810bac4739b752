//! Backend claim signing with recoverable ECDSA

use alloy_primitives::{Address, B256};
use k256::ecdsa::{SigningKey, VerifyingKey};

use crate::commitment::{eth_signed_message_hash, keccak256, VoucherCommitment};
use crate::error::{Result, VoucherError};
use crate::types::{ClaimAuthorization, SigningScheme, VoucherSignature};

/// Holds the backend private scalar and signs claim commitments.
///
/// The key never leaves this struct and is never logged; k256 redacts the
/// scalar from its Debug output.
#[derive(Debug)]
pub struct BackendSigner {
    signing_key: SigningKey,
    address: Address,
}

impl BackendSigner {
    /// Create a signer from a 0x-prefixed hex private key.
    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| VoucherError::InvalidKey(format!("invalid hex: {e}")))?;

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| VoucherError::InvalidKey(format!("not a valid secp256k1 scalar: {e}")))?;

        let address = address_of(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The signer's Ethereum address, for comparison against the contract's
    /// configured `backendSigner`.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a message hash under the given scheme.
    ///
    /// The scheme must match what the verifying contract recovers with; that
    /// choice is forced on the caller rather than defaulted here.
    pub fn sign(&self, message_hash: B256, scheme: SigningScheme) -> Result<VoucherSignature> {
        let digest = match scheme {
            SigningScheme::RawDigest => message_hash,
            SigningScheme::EthSignedMessage => eth_signed_message_hash(message_hash),
        };

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| VoucherError::InvalidKey(format!("signing failed: {e}")))?;

        let bytes = signature.to_bytes();
        Ok(VoucherSignature {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..]),
            v: 27 + recovery_id.to_byte(),
        })
    }

    /// Produce the signed claim payload handed back to a claimant.
    pub fn authorize_claim(
        &self,
        commitment: &VoucherCommitment,
        scheme: SigningScheme,
    ) -> Result<ClaimAuthorization> {
        let signature = self.sign(commitment.message_hash(), scheme)?;
        let deadline: u64 =
            commitment
                .deadline
                .try_into()
                .map_err(|_| VoucherError::Encoding {
                    field: "deadline",
                    reason: format!("{} does not fit in u64", commitment.deadline),
                })?;

        Ok(ClaimAuthorization {
            voucher_id: format!("0x{}", hex::encode(commitment.voucher_id)),
            recipient: format!("0x{}", hex::encode(commitment.recipient)),
            deadline,
            signature: signature.to_hex(),
            contract_address: format!("0x{}", hex::encode(commitment.verifying_contract)),
        })
    }
}

/// Ethereum address of a public key: low 20 bytes of the Keccak-256 of the
/// uncompressed point, 0x04 prefix stripped.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash.as_slice()[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    // secp256k1 generator key; its address showed up all over the original
    // incident as "the backend wallet".
    const TEST_KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn derives_the_expected_address() {
        let signer = BackendSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            format!("0x{}", hex::encode(signer.address())),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn rejects_garbage_keys() {
        assert!(matches!(
            BackendSigner::from_hex("0xzz").unwrap_err(),
            VoucherError::InvalidKey(_)
        ));
        // zero is not a valid scalar
        let zero = format!("0x{}", "00".repeat(32));
        assert!(matches!(
            BackendSigner::from_hex(&zero).unwrap_err(),
            VoucherError::InvalidKey(_)
        ));
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = BackendSigner::from_hex(TEST_KEY).unwrap();
        let hash = keccak256(b"deterministic");
        let a = signer.sign(hash, SigningScheme::RawDigest).unwrap();
        let b = signer.sign(hash, SigningScheme::RawDigest).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn schemes_produce_distinct_signatures() {
        let signer = BackendSigner::from_hex(TEST_KEY).unwrap();
        let hash = keccak256(b"scheme split");
        let raw = signer.sign(hash, SigningScheme::RawDigest).unwrap();
        let prefixed = signer.sign(hash, SigningScheme::EthSignedMessage).unwrap();
        assert_ne!(raw, prefixed);
    }

    #[test]
    fn authorize_claim_emits_parseable_payload() {
        let signer = BackendSigner::from_hex(TEST_KEY).unwrap();
        let commitment = VoucherCommitment::from_hex_parts(
            "0xadeea4c8e0c60f95c97fe102e11d8b1c5d1ddd9d58bbd63f65e45abbc0e3f98b",
            "0x9d47330f73336cedb75695dd0391ada2c6be529d",
            1721506060,
            "0x66Eb0Aa46827e5F3fFcb6Dea23C309CB401690B6",
            42161,
        )
        .unwrap();

        let auth = signer
            .authorize_claim(&commitment, SigningScheme::EthSignedMessage)
            .unwrap();

        assert_eq!(auth.deadline, 1721506060);
        assert_eq!(auth.signature.len(), 2 + 65 * 2);
        VoucherSignature::from_hex(&auth.signature).unwrap();
    }

    #[test]
    fn oversized_deadline_is_an_encoding_error() {
        let signer = BackendSigner::from_hex(TEST_KEY).unwrap();
        let mut commitment = VoucherCommitment::from_hex_parts(
            "0xadeea4c8e0c60f95c97fe102e11d8b1c5d1ddd9d58bbd63f65e45abbc0e3f98b",
            "0x9d47330f73336cedb75695dd0391ada2c6be529d",
            0,
            "0x66Eb0Aa46827e5F3fFcb6Dea23C309CB401690B6",
            42161,
        )
        .unwrap();
        commitment.deadline = U256::MAX;

        assert!(matches!(
            signer
                .authorize_claim(&commitment, SigningScheme::RawDigest)
                .unwrap_err(),
            VoucherError::Encoding { field: "deadline", .. }
        ));
    }
}
