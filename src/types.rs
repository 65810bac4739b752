//! Shared types for signatures and claim authorizations

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoucherError};

/// Which digest a signature commits to.
///
/// The verifying contract accepts exactly one of these and recovery under the
/// wrong one yields a different address. There is deliberately no `Default`
/// impl: every call site has to state which convention it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// Sign the 32-byte message hash directly.
    RawDigest,
    /// Sign `keccak256("\x19Ethereum Signed Message:\n32" || hash)` (EIP-191).
    EthSignedMessage,
}

/// A recoverable secp256k1 signature in Ethereum's 65-byte wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoucherSignature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl VoucherSignature {
    /// Parse the `r || s || v` wire form. Accepts `v` in {0, 1, 27, 28}.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(VoucherError::MalformedSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }
        let v = bytes[64];
        if !matches!(v, 0 | 1 | 27 | 28) {
            return Err(VoucherError::MalformedSignature(format!(
                "recovery byte {v} out of range"
            )));
        }
        Ok(Self {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
            v,
        })
    }

    /// Parse a 0x-prefixed hex signature as produced by `to_hex`.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recovery id normalized to 0 or 1.
    pub fn recovery_id(&self) -> u8 {
        if self.v >= 27 {
            self.v - 27
        } else {
            self.v
        }
    }
}

/// Signed claim payload handed back to API consumers.
///
/// The recipient submits these fields verbatim to the contract's
/// `claimVoucher(bytes32,address,uint256,bytes)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAuthorization {
    /// Voucher id, 0x-prefixed bytes32 hex
    pub voucher_id: String,

    /// Recipient address bound into the signature
    pub recipient: String,

    /// Unix timestamp after which the signature is void
    pub deadline: u64,

    /// 65-byte backend signature, 0x-prefixed hex
    pub signature: String,

    /// Contract the signature is scoped to
    pub contract_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_round_trips() {
        let sig = VoucherSignature {
            r: B256::repeat_byte(0xaa),
            s: B256::repeat_byte(0xbb),
            v: 28,
        };
        let parsed = VoucherSignature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
        assert_eq!(parsed.recovery_id(), 1);
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let err = VoucherSignature::from_bytes(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, VoucherError::MalformedSignature(_)));
    }

    #[test]
    fn bogus_recovery_byte_is_rejected() {
        let mut bytes = [0u8; 65];
        bytes[64] = 29;
        let err = VoucherSignature::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, VoucherError::MalformedSignature(_)));
    }

    #[test]
    fn legacy_and_compact_recovery_bytes_normalize() {
        let mut bytes = [0u8; 65];
        bytes[64] = 27;
        assert_eq!(VoucherSignature::from_bytes(&bytes).unwrap().recovery_id(), 0);
        bytes[64] = 1;
        assert_eq!(VoucherSignature::from_bytes(&bytes).unwrap().recovery_id(), 1);
    }
}
