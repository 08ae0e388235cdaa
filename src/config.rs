use crate::error::{AppError, Result};

/// Bucket lengths for time-keyed snapshots (seconds).
pub const SEC_PER_DAY: u64 = 86_400;
pub const SEC_PER_HOUR: u64 = 3_600;

/// Pool share tokens are WAD-scaled regardless of the liquidity asset.
pub const POOL_WAD_DECIMALS: u32 = 18;

/// Fallback when a token's decimals were never observed.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Reward schedules run for 7 days unless the distributor says otherwise.
pub const REWARD_DEFAULT_DURATION_SECS: u64 = 604_800;

/// Sentinel for addresses the event stream has not supplied yet.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Sentinel for entity names the event stream has not supplied yet.
pub const UNPROVIDED_NAME: &str = "NOT_PROVIDED";

/// Singleton key for the protocol record.
pub const PROTOCOL_ID: &str = "0xc234c62c8c09687dff0d9047e40042cd166f3600";

pub const PROTOCOL_NAME: &str = "Maple v1";
pub const PROTOCOL_SLUG: &str = "maple-v1";
pub const PROTOCOL_NETWORK: &str = "MAINNET";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// JSONL file of decoded chain events to replay (JOURNAL_PATH).
    pub journal_path: String,
    /// JSON table of token id → USD quote backing the oracle stand-in (QUOTES_PATH).
    pub quotes_path: Option<String>,
    /// Token ids priced at a fixed 1.00 USD (PEGGED_TOKENS, comma-separated).
    pub pegged_tokens: Vec<String>,
    /// Where /deployments.json comes from: a URL or a local file path (DEPLOYMENTS_SOURCE).
    pub deployments_source: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            journal_path: std::env::var("JOURNAL_PATH")
                .unwrap_or_else(|_| "events.jsonl".to_string()),
            quotes_path: std::env::var("QUOTES_PATH").ok(),
            pegged_tokens: std::env::var("PEGGED_TOKENS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            deployments_source: std::env::var("DEPLOYMENTS_SOURCE").ok(),
        })
    }
}
