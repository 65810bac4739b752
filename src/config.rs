//! Configuration management for the indexer side-car

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint of the chain-data provider
    pub rpc_endpoint: String,

    /// Voucher contract address to scan
    pub voucher_contract: String,

    /// Chain id bound into claim signatures
    pub chain_id: u64,

    /// Private key of the backend claim signer
    pub backend_private_key: String,

    /// Address the contract's backendSigner is set to, if known; checked
    /// against the derived key address at startup
    pub expected_signer: Option<String>,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum block range per eth_getLogs query
    pub scan_batch_size: u64,

    /// Block to start indexing from on a fresh cursor
    pub start_block: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Claim signature lifetime in seconds
    pub claim_deadline_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoint: "https://arb1.arbitrum.io/rpc".to_string(),
            voucher_contract: "0x66Eb0Aa46827e5F3fFcb6Dea23C309CB401690B6".to_string(),
            chain_id: 42161, // Arbitrum One
            backend_private_key: String::new(),
            expected_signer: None,
            poll_interval_secs: 10,
            scan_batch_size: 1000,
            start_block: 0,
            request_timeout_secs: 30,
            claim_deadline_secs: 3600, // 1 hour
        }
    }
}

impl Config {
    /// Load configuration from file (if present) with environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = env::var("RPC_ENDPOINT") {
            self.rpc_endpoint = endpoint;
        }

        if let Ok(address) = env::var("VOUCHER_CONTRACT") {
            self.voucher_contract = address;
        }

        if let Ok(id) = env::var("CHAIN_ID") {
            if let Ok(id) = id.parse() {
                self.chain_id = id;
            }
        }

        if let Ok(key) = env::var("BACKEND_PRIVATE_KEY") {
            self.backend_private_key = key;
        }

        if let Ok(address) = env::var("EXPECTED_SIGNER") {
            self.expected_signer = Some(address);
        }

        if let Ok(interval) = env::var("POLL_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.poll_interval_secs = secs;
            }
        }

        if let Ok(batch) = env::var("SCAN_BATCH_SIZE") {
            if let Ok(size) = batch.parse() {
                self.scan_batch_size = size;
            }
        }

        if let Ok(block) = env::var("START_BLOCK") {
            if let Ok(number) = block.parse() {
                self.start_block = number;
            }
        }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.backend_private_key.is_empty() {
            return Err(anyhow::anyhow!("Backend private key is required"));
        }

        if self.voucher_contract.is_empty() {
            return Err(anyhow::anyhow!("Voucher contract address is required"));
        }

        if self.scan_batch_size == 0 {
            return Err(anyhow::anyhow!("Scan batch size must be at least 1"));
        }

        Ok(())
    }
}
