use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use crate::error::Result;
use crate::rate_limit_config::RateLimitConfig;

/// Where fingerprint counters are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Shared redis instance; consistent across processes
    Redis,
    /// In-process maps; single process only
    Memory,
}

/// Process settings, read from flags or the environment
#[derive(Debug, Clone, Parser)]
#[command(name = "gatekeeper", version, about = "HTTP admission control with dual-window rate limiting")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Counter store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreBackend::Redis)]
    pub store: StoreBackend,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Reconnect attempts before a store call fails
    #[arg(long, env = "REDIS_RETRIES", default_value_t = 2)]
    pub redis_retries: usize,

    /// JSON rate limit policy file; built-in defaults when omitted
    #[arg(long, env = "POLICY_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Log level for the gatekeeper target
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from command line flags and environment variables
    pub fn from_env() -> Self {
        Config::parse()
    }

    /// Rate limit policies, validated once here and read-only afterwards.
    pub fn load_rate_limits(&self) -> Result<RateLimitConfig> {
        match &self.policy_file {
            Some(path) => {
                info!(path = %path.display(), "Loading rate limit policy file");
                RateLimitConfig::from_file(path)
            }
            None => {
                info!("No policy file given, using built-in rate limits");
                Ok(RateLimitConfig::default())
            }
        }
    }
}
