pub mod algorithms;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod key_generator;
pub mod middleware;
pub mod policy;
pub mod rate_limit_config;
pub mod redis;
pub mod response;
pub mod server;
pub mod store;
pub mod throttler;

pub use config::Config;
pub use error::{GatekeeperError, Result};
pub use rate_limit_config::{OverrideEvent, RateLimitConfig, RateLimitPolicy, SlidingWindow};
pub use server::{create_app, AppState};
pub use throttler::{EvaluationResult, Throttler};
