//! Signature recovery and signer verification

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::scalar::IsHigh;

use crate::commitment::eth_signed_message_hash;
use crate::error::{Result, VoucherError};
use crate::signer::address_of;
use crate::types::{SigningScheme, VoucherSignature};

/// Recover the address that produced `signature` over `message_hash` under
/// the given scheme.
///
/// Structural problems (out-of-range scalars, high `s`, no recoverable
/// point) are errors; a recovery that simply yields an unexpected address
/// is not.
pub fn recover_signer(
    signature: &VoucherSignature,
    message_hash: B256,
    scheme: SigningScheme,
) -> Result<Address> {
    let digest = match scheme {
        SigningScheme::RawDigest => message_hash,
        SigningScheme::EthSignedMessage => eth_signed_message_hash(message_hash),
    };

    let sig = Signature::from_scalars(signature.r.0, signature.s.0)
        .map_err(|e| VoucherError::MalformedSignature(format!("r/s out of range: {e}")))?;

    // The contract side rejects malleable signatures, so mirror its low-s rule.
    if bool::from(sig.s().is_high()) {
        return Err(VoucherError::MalformedSignature(
            "s is in the upper half of the curve order".to_string(),
        ));
    }

    let recovery_id = RecoveryId::from_byte(signature.recovery_id()).ok_or_else(|| {
        VoucherError::MalformedSignature(format!("recovery byte {} out of range", signature.v))
    })?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| VoucherError::MalformedSignature(format!("recovery failed: {e}")))?;

    Ok(address_of(&key))
}

/// Check a signature against the expected signer address.
///
/// A mismatch is `Ok(false)`, never an error. Addresses compare as 20-byte
/// values, so the hex casing they arrived in is irrelevant.
pub fn verify_signer(
    signature: &VoucherSignature,
    message_hash: B256,
    scheme: SigningScheme,
    expected: Address,
) -> Result<bool> {
    Ok(recover_signer(signature, message_hash, scheme)? == expected)
}
