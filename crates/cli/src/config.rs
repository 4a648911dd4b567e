use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "hvsync";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const TOKEN_FILE_NAME: &str = ".vault-token";
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Optional on-disk defaults, read from `~/.hvsync/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Vault server address
    #[serde(default)]
    pub address: Option<Url>,
    /// Vault token
    #[serde(default)]
    pub token: Option<String>,
    /// Vault Enterprise namespace
    #[serde(default)]
    pub namespace: Option<String>,
}

impl FileConfig {
    /// Get the default config file path (~/.hvsync/config.toml)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)).join(CONFIG_FILE_NAME))
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. The default path is optional and a
    /// missing file yields an empty config.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match custom_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path));
                }
                path
            }
            None => match Self::default_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let config_toml = fs::read_to_string(&path)?;
        Ok(toml::from_str(&config_toml)?)
    }
}

/// Fully resolved connection settings for the Vault client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub address: Url,
    pub token: Option<String>,
    pub namespace: Option<String>,
}

impl ClientConfig {
    /// Resolve connection settings.
    ///
    /// Priority per field: explicit flag (clap already folds in `VAULT_*`
    /// env vars) > config file > built-in default. The token additionally
    /// falls back to `~/.vault-token`.
    pub fn resolve(
        address: Option<Url>,
        token: Option<String>,
        namespace: Option<String>,
        file: FileConfig,
    ) -> Result<Self, ConfigError> {
        let address = match address.or(file.address) {
            Some(address) => address,
            None => Url::parse(DEFAULT_ADDRESS)?,
        };

        let token = match token.or(file.token) {
            Some(token) => Some(token),
            None => match dirs::home_dir() {
                Some(home) => read_token_file(&home.join(TOKEN_FILE_NAME))?,
                None => None,
            },
        };

        Ok(Self {
            address,
            token,
            namespace: namespace.or(file.namespace),
        })
    }
}

/// Read a Vault token helper file, if present
pub fn read_token_file(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let token = fs::read_to_string(path)?;
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(token.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing config file: {0}")]
    MissingFile(PathBuf),

    #[error("invalid Vault address: {0}")]
    Address(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
