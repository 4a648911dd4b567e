// Vault HTTP client implementing the reconciliation backend
pub mod client;
// Client configuration (flags, env, config file)
pub mod config;
pub mod logging;
pub mod version;

pub use client::{describe_api_error, find_api_error, ApiError, VaultClient};
pub use config::{ClientConfig, ConfigError, FileConfig};
pub use version::BuildInfo;
