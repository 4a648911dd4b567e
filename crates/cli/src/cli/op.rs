use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use hvsync_cli::{ApiError, ClientConfig, ConfigError, FileConfig, VaultClient};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create Vault client: {0}")]
    Client(#[from] ApiError),
}

/// Resolve client settings from flags, env and the config file.
pub fn resolve_config(
    address: Option<Url>,
    token: Option<String>,
    namespace: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<ClientConfig, ConfigError> {
    let file = FileConfig::load(config_path)?;
    ClientConfig::resolve(address, token, namespace, file)
}

/// Connection settings as given on the command line
#[derive(Debug, Clone, Default)]
pub struct ClientArgs {
    pub address: Option<Url>,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub config_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct OpContext {
    /// Client settings, resolved only by ops that talk to Vault
    pub client_args: ClientArgs,
    /// Cancelled on ctrl-c
    pub cancel: CancellationToken,
}

impl OpContext {
    pub fn new(client_args: ClientArgs, cancel: CancellationToken) -> Self {
        Self {
            client_args,
            cancel,
        }
    }

    /// Resolve configuration and build the Vault client shared by every
    ///  concurrent operation of a command.
    pub fn client(&self) -> Result<Arc<VaultClient>, ContextError> {
        let args = self.client_args.clone();
        let config = resolve_config(args.address, args.token, args.namespace, args.config_path)?;
        tracing::debug!(address = %config.address, namespace = ?config.namespace, "resolved configuration");
        Ok(Arc::new(VaultClient::new(&config)?))
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
