use std::fmt;
use std::path::PathBuf;

use clap::Args;

use common::prelude::{DownloadError, DownloadSummary, Downloader, LocalTree};
use hvsync_cli::ApiError;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Download {
    /// Directory to write the tree into
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadOpError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("error downloading from Vault: {0}")]
    Download(#[from] DownloadError<ApiError>),
}

#[derive(Debug)]
pub struct DownloadOutput {
    pub root: PathBuf,
    pub summary: DownloadSummary,
}

impl fmt::Display for DownloadOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Downloaded Vault state to {}.", self.root.display())?;
        write!(f, "{}", self.summary)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Download {
    type Error = DownloadOpError;
    type Output = DownloadOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let tree = LocalTree::new(&self.directory);

        let downloader = Downloader::new(ctx.client()?, ctx.cancel.clone());
        let summary = downloader
            .download(&tree.auth_dir(), &tree.policy_dir())
            .await?;

        Ok(DownloadOutput {
            root: tree.root().to_path_buf(),
            summary,
        })
    }
}
