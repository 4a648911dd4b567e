use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{collection_path, object_path, Backend, RemoteError};
use crate::executor::{BatchError, BoundedExecutor, Operation, MAX_IN_FLIGHT};
use crate::local_tree::{self, LocalTreeError};
use crate::mount_kind::MountKind;

/// Built-in policies with no body to materialize; the server refuses
///  to have them written back.
const BUILTIN_POLICIES: &[&str] = &["root"];

/// A single fetch-and-store step that failed
#[derive(Debug, thiserror::Error)]
pub enum FetchError<E> {
    #[error(transparent)]
    Remote(#[from] RemoteError<E>),
    #[error(transparent)]
    Local(#[from] LocalTreeError),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError<E> {
    #[error("error listing policies: {0}")]
    ListPolicies(#[source] E),
    #[error("error downloading policies: {0}")]
    Policies(#[source] BatchError<FetchError<E>>),
    #[error("error listing auth mounts: {0}")]
    ListMounts(#[source] E),
    #[error("error listing roles for mount {0}: {1}")]
    ListRoles(String, #[source] E),
    #[error("error downloading roles for mount {0}: {1}")]
    Roles(String, #[source] BatchError<FetchError<E>>),
    #[error("download cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub policies: usize,
    pub roles: usize,
    pub mounts: usize,
    pub mounts_skipped: Vec<String>,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "downloaded {} policies and {} roles across {} mount(s)",
            self.policies, self.roles, self.mounts
        )?;
        if !self.mounts_skipped.is_empty() {
            write!(
                f,
                "\nskipped unsupported mounts: {}",
                self.mounts_skipped.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Materializes live server state into a local tree, laid out so that
///  the result can be applied back unchanged.
///
/// Existing local files are overwritten; files with no remote
///  counterpart are left in place.
#[derive(Debug)]
pub struct Downloader<B: Backend> {
    backend: Arc<B>,
    executor: BoundedExecutor,
}

impl<B: Backend> Downloader<B> {
    pub fn new(backend: Arc<B>, cancel: CancellationToken) -> Self {
        Self {
            backend,
            executor: BoundedExecutor::new(MAX_IN_FLIGHT, cancel),
        }
    }

    pub async fn download(
        &self,
        auth_dir: &Path,
        policy_dir: &Path,
    ) -> Result<DownloadSummary, DownloadError<B::Error>> {
        info!("downloading from server");

        let mut summary = DownloadSummary {
            policies: self.download_policies(policy_dir).await?,
            ..Default::default()
        };
        self.download_auth(auth_dir, &mut summary).await?;

        info!(
            policies = summary.policies,
            roles = summary.roles,
            "download complete"
        );
        Ok(summary)
    }

    /// Write every policy to `policy_dir`. Returns the number written.
    pub async fn download_policies(
        &self,
        policy_dir: &Path,
    ) -> Result<usize, DownloadError<B::Error>> {
        info!(directory = %policy_dir.display(), "downloading policies");

        let names = self
            .remote(self.backend.list_policies())
            .await?
            .map_err(DownloadError::ListPolicies)?;

        let written = Arc::new(AtomicUsize::new(0));
        let operations: Vec<Operation<FetchError<B::Error>>> = names
            .into_iter()
            .filter(|name| !BUILTIN_POLICIES.contains(&name.as_str()))
            .filter(|name| usable_name(name, "policy"))
            .map(|name| {
                let backend = Arc::clone(&self.backend);
                let dir = policy_dir.to_path_buf();
                let written = Arc::clone(&written);
                Box::pin(fetch_policy(backend, dir, name, written)) as Operation<_>
            })
            .collect();

        self.executor
            .run(operations)
            .await
            .map_err(DownloadError::Policies)?;

        Ok(written.load(Ordering::Relaxed))
    }

    /// Write every supported mount's objects under `auth_dir`.
    pub async fn download_auth(
        &self,
        auth_dir: &Path,
        summary: &mut DownloadSummary,
    ) -> Result<(), DownloadError<B::Error>> {
        info!(directory = %auth_dir.display(), "downloading auth roles");

        let mut mounts = self
            .remote(self.backend.list_auth_mounts())
            .await?
            .map_err(DownloadError::ListMounts)?;
        mounts.sort();

        for mount in mounts {
            let Some(segment) = MountKind::parse(&mount.kind).segment() else {
                warn!(mount = %mount.name, mount_type = %mount.kind, "unsupported auth mount type, skipping");
                summary.mounts_skipped.push(mount.name);
                continue;
            };

            let list_path = collection_path(&mount.name, segment.as_str());
            let names = self
                .remote(self.backend.list(&list_path))
                .await?
                .map_err(|e| DownloadError::ListRoles(mount.name.clone(), e))?
                .unwrap_or_default();

            let local_dir: PathBuf = local_tree::role_dir(auth_dir, &mount.name, segment.as_str());
            let written = Arc::new(AtomicUsize::new(0));

            let operations: Vec<Operation<FetchError<B::Error>>> = names
                .into_iter()
                .filter(|name| usable_name(name, &mount.name))
                .map(|name| {
                    let backend = Arc::clone(&self.backend);
                    let path = object_path(&mount.name, segment.as_str(), &name);
                    let dir = local_dir.clone();
                    let written = Arc::clone(&written);
                    Box::pin(fetch_role(backend, path, dir, name, written)) as Operation<_>
                })
                .collect();

            self.executor
                .run(operations)
                .await
                .map_err(|e| DownloadError::Roles(mount.name.clone(), e))?;

            summary.roles += written.load(Ordering::Relaxed);
            summary.mounts += 1;
        }

        Ok(())
    }

    async fn remote<T, F>(&self, call: F) -> Result<T, DownloadError<B::Error>>
    where
        F: Future<Output = T>,
    {
        let cancel = self.executor.cancel_token();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            out = call => Ok(out),
        }
    }
}

/// Names that cannot be stored as a single file are skipped, so they
///  never land outside their directory or come back renamed on apply.
fn usable_name(name: &str, scope: &str) -> bool {
    if local_tree::is_entry_name(name) {
        return true;
    }
    warn!(name = %name, scope = %scope, "name is not usable as a local file name, skipping");
    false
}

async fn fetch_policy<B: Backend>(
    backend: Arc<B>,
    dir: PathBuf,
    name: String,
    written: Arc<AtomicUsize>,
) -> Result<(), FetchError<B::Error>> {
    let body = backend
        .read_policy(&name)
        .await
        .map_err(|e| RemoteError::Read(format!("policy {}", name), e))?;
    let Some(body) = body else {
        debug!(policy = %name, "policy vanished before it could be read");
        return Ok(());
    };
    local_tree::write_policy(&dir, &name, &body)?;
    written.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

async fn fetch_role<B: Backend>(
    backend: Arc<B>,
    path: String,
    dir: PathBuf,
    name: String,
    written: Arc<AtomicUsize>,
) -> Result<(), FetchError<B::Error>> {
    let data = backend
        .read(&path)
        .await
        .map_err(|e| RemoteError::Read(path.clone(), e))?;
    let Some(data) = data else {
        debug!(path = %path, "role vanished before it could be read");
        return Ok(());
    };
    local_tree::write_role(&dir, &name, &data)?;
    written.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
