//! Canonical packed encoding and Keccak-256 commitment for claim vouchers
//!
//! The verifying contract recomputes
//! `keccak256(abi.encodePacked(voucherId, recipient, deadline, address(this), block.chainid))`
//! and recovers the backend signature against it. The byte layout here must
//! match that contract bit-for-bit; any drift silently invalidates every
//! signature the backend produces.

use alloy_primitives::{Address, B256, U256};
use sha3::{Digest, Keccak256};

use crate::error::{Result, VoucherError};

/// EIP-191 prefix for a 32-byte message, as applied by the contract's
/// `toEthSignedMessageHash`.
const ETH_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Packed length: bytes32 + address + uint256 + address + uint256.
pub const PACKED_LEN: usize = 32 + 20 + 32 + 20 + 32;

/// Keccak-256 digest of arbitrary bytes.
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    B256::from_slice(&hasher.finalize())
}

/// The EIP-191 "personal sign" digest of a 32-byte message hash.
pub fn eth_signed_message_hash(message_hash: B256) -> B256 {
    let prefixed = [ETH_SIGNED_MESSAGE_PREFIX, message_hash.as_slice()].concat();
    keccak256(prefixed)
}

/// The fields bound together by a claim signature.
///
/// Field order is fixed and load-bearing: the packed encoding concatenates
/// each field at its natural width with no padding in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherCommitment {
    pub voucher_id: B256,
    pub recipient: Address,
    pub deadline: U256,
    pub verifying_contract: Address,
    pub chain_id: U256,
}

impl VoucherCommitment {
    pub fn new(
        voucher_id: B256,
        recipient: Address,
        deadline: U256,
        verifying_contract: Address,
        chain_id: U256,
    ) -> Self {
        Self {
            voucher_id,
            recipient,
            deadline,
            verifying_contract,
            chain_id,
        }
    }

    /// Build a commitment from hex-encoded fields, validating widths.
    pub fn from_hex_parts(
        voucher_id: &str,
        recipient: &str,
        deadline: u64,
        verifying_contract: &str,
        chain_id: u64,
    ) -> Result<Self> {
        Ok(Self {
            voucher_id: parse_b256("voucher_id", voucher_id)?,
            recipient: parse_address("recipient", recipient)?,
            deadline: U256::from(deadline),
            verifying_contract: parse_address("verifying_contract", verifying_contract)?,
            chain_id: U256::from(chain_id),
        })
    }

    /// Build a commitment whose deadline is `ttl_secs` from now.
    pub fn expiring_in(
        voucher_id: B256,
        recipient: Address,
        ttl_secs: u64,
        verifying_contract: Address,
        chain_id: u64,
    ) -> Self {
        let deadline = U256::from(chrono::Utc::now().timestamp() as u64 + ttl_secs);
        Self::new(
            voucher_id,
            recipient,
            deadline,
            verifying_contract,
            U256::from(chain_id),
        )
    }

    /// Packed big-endian encoding, 136 bytes, no inter-field padding.
    pub fn encode_packed(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(PACKED_LEN);
        encoded.extend_from_slice(self.voucher_id.as_slice()); // bytes32
        encoded.extend_from_slice(self.recipient.as_slice()); // address (20 bytes)
        encoded.extend_from_slice(&self.deadline.to_be_bytes::<32>()); // uint256
        encoded.extend_from_slice(self.verifying_contract.as_slice()); // address (20 bytes)
        encoded.extend_from_slice(&self.chain_id.to_be_bytes::<32>()); // uint256
        encoded
    }

    /// Keccak-256 of the packed encoding; the value the backend signs and
    /// the contract recomputes.
    pub fn message_hash(&self) -> B256 {
        keccak256(self.encode_packed())
    }
}

/// Parse a 0x-prefixed 32-byte hex value, reporting the offending field.
pub fn parse_b256(field: &'static str, value: &str) -> Result<B256> {
    let bytes = decode_hex(field, value)?;
    if bytes.len() != 32 {
        return Err(VoucherError::Encoding {
            field,
            reason: format!("expected 32 bytes, got {} ({value})", bytes.len()),
        });
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse a 0x-prefixed 20-byte hex address, case-insensitively.
pub fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    let bytes = decode_hex(field, value)?;
    if bytes.len() != 20 {
        return Err(VoucherError::Encoding {
            field,
            reason: format!("expected 20 bytes, got {} ({value})", bytes.len()),
        });
    }
    Ok(Address::from_slice(&bytes))
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).map_err(|e| VoucherError::Encoding {
        field,
        reason: format!("invalid hex ({e}): {value}"),
    })
}
