use std::fmt;
use std::path::PathBuf;

use clap::Args;

use common::prelude::{ApplyError, ApplySummary, LocalTree, Reconciler};
use hvsync_cli::ApiError;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Apply {
    /// Root of the local tree (holds `sys/policies/acl` and `auth`)
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyOpError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("error applying changes to Vault: {0}")]
    Apply(#[from] ApplyError<ApiError>),
}

#[derive(Debug)]
pub struct ApplyOutput(pub ApplySummary);

impl fmt::Display for ApplyOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Successfully applied changes to Vault.")?;
        write!(f, "{}", self.0)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Apply {
    type Error = ApplyOpError;
    type Output = ApplyOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let tree = LocalTree::new(&self.directory);
        tracing::debug!(root = %tree.root().display(), "applying local tree");

        let reconciler = Reconciler::new(ctx.client()?, ctx.cancel.clone());
        let summary = reconciler
            .apply(&tree.auth_dir(), &tree.policy_dir())
            .await?;

        Ok(ApplyOutput(summary))
    }
}
