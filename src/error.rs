//! Error types for the voucher verification core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoucherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error in field `{field}`: {reason}")]
    Encoding { field: &'static str, reason: String },

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Block range {from_block}..={to_block} rejected by provider: {message}")]
    RangeTooLarge {
        from_block: u64,
        to_block: u64,
        message: String,
    },

    #[error("Last processed block {last_processed} is ahead of chain tip {current_tip}")]
    InvalidRange {
        current_tip: u64,
        last_processed: u64,
    },

    #[error("Hex encoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VoucherError>;
