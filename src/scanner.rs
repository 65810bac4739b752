//! Historical log scanning and indexed-topic decoding
//!
//! Reconciles on-chain voucher events against backend state. Events are
//! matched by topic 0, the Keccak-256 of the canonical ABI signature string
//! (exact text, no spaces after commas).

use alloy_primitives::{Address, B256, U256};

use crate::commitment::keccak256;
use crate::error::{Result, VoucherError};
use crate::rpc::{RawLog, RpcClient};

pub const VOUCHER_CREATED_SIGNATURE: &str = "VoucherCreated(bytes32,address,uint256)";
pub const VOUCHER_CANCELLED_SIGNATURE: &str = "VoucherCancelled(bytes32,address,uint256)";

/// Topic 0 for an event: the digest of its canonical text signature.
pub fn event_signature_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Extract an address from an indexed topic slot.
///
/// Indexed address parameters occupy the low 20 bytes of the 32-byte slot;
/// the high 12 bytes are zero padding.
pub fn decode_indexed_address(topic: B256) -> Address {
    Address::from_slice(&topic.as_slice()[12..])
}

/// A decoded `VoucherCreated` or `VoucherCancelled` event. Both share the
/// same indexed layout: topic 1 is the voucher id, topic 2 the creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherEvent {
    pub voucher_id: B256,
    pub creator: Address,
    pub amount: U256,
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Decode the indexed topics of a voucher event log.
pub fn decode_voucher_event(log: &RawLog) -> Result<VoucherEvent> {
    if log.topics.len() < 3 {
        return Err(VoucherError::Encoding {
            field: "topics",
            reason: format!("expected 3 indexed topics, got {}", log.topics.len()),
        });
    }
    let block_number = log.block_number.ok_or_else(|| VoucherError::Encoding {
        field: "block_number",
        reason: "log is pending, no block number yet".to_string(),
    })?;
    let transaction_hash = log.transaction_hash.ok_or_else(|| VoucherError::Encoding {
        field: "transaction_hash",
        reason: "log is pending, no transaction hash yet".to_string(),
    })?;
    // Non-indexed amount rides in the data slot.
    let amount = U256::try_from_be_slice(&log.data).ok_or_else(|| VoucherError::Encoding {
        field: "data",
        reason: format!("expected a uint256 data slot, got {} bytes", log.data.len()),
    })?;

    Ok(VoucherEvent {
        voucher_id: log.topics[1],
        creator: decode_indexed_address(log.topics[2]),
        amount,
        block_number: block_number.to::<u64>(),
        transaction_hash,
    })
}

fn filter_by_topic(logs: Vec<RawLog>, topic: B256) -> Vec<RawLog> {
    logs.into_iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .collect()
}

/// Scans a contract's historical logs for voucher events.
pub struct EventScanner {
    rpc: RpcClient,
    contract: Address,
    created_topic: B256,
    cancelled_topic: B256,
}

impl EventScanner {
    pub fn new(rpc: RpcClient, contract: Address) -> Self {
        Self {
            rpc,
            contract,
            created_topic: event_signature_topic(VOUCHER_CREATED_SIGNATURE),
            cancelled_topic: event_signature_topic(VOUCHER_CANCELLED_SIGNATURE),
        }
    }

    /// Raw logs over the inclusive range whose topic 0 matches `topic`.
    ///
    /// Each invocation re-queries the provider; there is no caching and no
    /// internal retry.
    pub async fn scan(&self, topic: B256, from_block: u64, to_block: u64) -> Result<Vec<RawLog>> {
        let logs = self.rpc.get_logs(self.contract, from_block, to_block).await?;
        Ok(filter_by_topic(logs, topic))
    }

    pub async fn scan_created(&self, from_block: u64, to_block: u64) -> Result<Vec<VoucherEvent>> {
        self.scan(self.created_topic, from_block, to_block)
            .await?
            .iter()
            .map(decode_voucher_event)
            .collect()
    }

    pub async fn scan_cancelled(&self, from_block: u64, to_block: u64) -> Result<Vec<VoucherEvent>> {
        self.scan(self.cancelled_topic, from_block, to_block)
            .await?
            .iter()
            .map(decode_voucher_event)
            .collect()
    }
}
