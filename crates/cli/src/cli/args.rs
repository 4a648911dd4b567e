pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "hvsync")]
#[command(about = "Sync Vault policies and auth roles with a local directory tree")]
pub struct Args {
    /// Vault server address
    #[arg(long, global = true, env = "VAULT_ADDR")]
    pub address: Option<Url>,

    /// Vault token
    #[arg(long, global = true, env = "VAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Vault Enterprise namespace
    #[arg(long, global = true, env = "VAULT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to the config file (defaults to ~/.hvsync/config.toml)
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: crate::Command,
}
