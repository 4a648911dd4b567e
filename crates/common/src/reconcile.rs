use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{collection_path, object_path, AuthMount, Backend, Document, RemoteError};
use crate::diff::{plan, Plan, PROTECTED_POLICIES};
use crate::executor::{BatchError, BoundedExecutor, Operation, MAX_IN_FLIGHT};
use crate::local_tree::{self, LocalTreeError};
use crate::mount_kind::{MountKind, RoleSegment};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError<E> {
    #[error("error listing existing policies: {0}")]
    ListPolicies(#[source] E),
    #[error("error reading local policies: {0}")]
    LocalPolicies(#[source] LocalTreeError),
    #[error("error applying policy changes: {0}")]
    Policies(#[source] BatchError<RemoteError<E>>),
    #[error("error listing auth mounts: {0}")]
    ListMounts(#[source] E),
    #[error("error reading local roles for mount {0}: {1}")]
    LocalRoles(String, #[source] LocalTreeError),
    #[error("error listing existing roles for mount {0}: {1}")]
    ListRoles(String, #[source] E),
    #[error("error applying role changes for mount {0}: {1}")]
    Roles(String, #[source] BatchError<RemoteError<E>>),
    #[error("apply cancelled")]
    Cancelled,
}

/// What an apply did, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub policies_written: usize,
    pub policies_deleted: usize,
    pub roles_written: usize,
    pub roles_deleted: usize,
    pub mounts_reconciled: usize,
    /// Mounts left alone because their type is unsupported
    pub mounts_skipped: Vec<String>,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "policies: {} written, {} deleted\nroles: {} written, {} deleted across {} mount(s)",
            self.policies_written,
            self.policies_deleted,
            self.roles_written,
            self.roles_deleted,
            self.mounts_reconciled
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

/// Pushes a local tree to the server.
///
/// Policies are reconciled first, then every auth mount in turn. The
///  first unrecovered error aborts the apply; work already applied by
///  earlier batches stays applied.
#[derive(Debug)]
pub struct Reconciler<B: Backend> {
    backend: Arc<B>,
    executor: BoundedExecutor,
}

impl<B: Backend> Reconciler<B> {
    pub fn new(backend: Arc<B>, cancel: CancellationToken) -> Self {
        Self {
            backend,
            executor: BoundedExecutor::new(MAX_IN_FLIGHT, cancel),
        }
    }

    /// Override the default concurrency ceiling
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.executor = BoundedExecutor::new(limit, self.executor.cancel_token().clone());
        self
    }

    pub async fn apply(
        &self,
        auth_dir: &Path,
        policy_dir: &Path,
    ) -> Result<ApplySummary, ApplyError<B::Error>> {
        info!("applying changes");

        let mut summary = ApplySummary::default();
        self.apply_policies(policy_dir, &mut summary).await?;
        self.apply_auth(auth_dir, &mut summary).await?;

        info!(
            policies_written = summary.policies_written,
            policies_deleted = summary.policies_deleted,
            roles_written = summary.roles_written,
            roles_deleted = summary.roles_deleted,
            "changes applied"
        );
        Ok(summary)
    }

    async fn apply_policies(
        &self,
        policy_dir: &Path,
        summary: &mut ApplySummary,
    ) -> Result<(), ApplyError<B::Error>> {
        info!(directory = %policy_dir.display(), "applying policy changes");

        let existing = self
            .remote(self.backend.list_policies())
            .await?
            .map_err(ApplyError::ListPolicies)?;
        let local = local_tree::read_policies(policy_dir).map_err(ApplyError::LocalPolicies)?;

        let Plan { writes, deletes } = plan(local, existing, PROTECTED_POLICIES);
        summary.policies_written = writes.len();
        summary.policies_deleted = deletes.len();

        let mut operations: Vec<Operation<RemoteError<B::Error>>> =
            Vec::with_capacity(writes.len() + deletes.len());

        for (name, body) in writes {
            let backend = Arc::clone(&self.backend);
            operations.push(Box::pin(async move {
                debug!(policy = %name, "writing policy");
                backend
                    .write_policy(&name, &body)
                    .await
                    .map_err(|e| RemoteError::Write(format!("policy {}", name), e))
            }));
        }

        for name in deletes {
            let backend = Arc::clone(&self.backend);
            operations.push(Box::pin(async move {
                debug!(policy = %name, "deleting policy");
                backend
                    .delete_policy(&name)
                    .await
                    .map_err(|e| RemoteError::Delete(format!("policy {}", name), e))
            }));
        }

        self.executor
            .run(operations)
            .await
            .map_err(ApplyError::Policies)?;

        info!("policy changes applied");
        Ok(())
    }

    async fn apply_auth(
        &self,
        auth_dir: &Path,
        summary: &mut ApplySummary,
    ) -> Result<(), ApplyError<B::Error>> {
        info!(directory = %auth_dir.display(), "applying auth role changes");

        let mut mounts = self
            .remote(self.backend.list_auth_mounts())
            .await?
            .map_err(ApplyError::ListMounts)?;
        mounts.sort();

        for mount in mounts {
            debug!(mount = %mount.name, mount_type = %mount.kind, "processing auth mount");

            let Some(segment) = MountKind::parse(&mount.kind).segment() else {
                warn!(mount = %mount.name, mount_type = %mount.kind, "unsupported auth mount type, skipping");
                summary.mounts_skipped.push(mount.name);
                continue;
            };

            let (written, deleted) = self.apply_mount(auth_dir, &mount, segment).await?;
            summary.roles_written += written;
            summary.roles_deleted += deleted;
            summary.mounts_reconciled += 1;
        }

        info!("auth role changes applied");
        Ok(())
    }

    /// Reconcile one mount's role-like objects. Returns (written, deleted).
    async fn apply_mount(
        &self,
        auth_dir: &Path,
        mount: &AuthMount,
        segment: RoleSegment,
    ) -> Result<(usize, usize), ApplyError<B::Error>> {
        let local_dir = local_tree::role_dir(auth_dir, &mount.name, segment.as_str());
        debug!(local_mount_dir = %local_dir.display(), "reading local auth roles for mount");

        let local = local_tree::read_roles(&local_dir)
            .map_err(|e| ApplyError::LocalRoles(mount.name.clone(), e))?;

        let list_path = collection_path(&mount.name, segment.as_str());
        let existing = self
            .remote(self.backend.list(&list_path))
            .await?
            .map_err(|e| ApplyError::ListRoles(mount.name.clone(), e))?
            .unwrap_or_default();

        let Plan { writes, deletes } = plan(local, existing, &[]);
        let counts = (writes.len(), deletes.len());

        let mut operations: Vec<Operation<RemoteError<B::Error>>> =
            Vec::with_capacity(counts.0 + counts.1);

        for (name, data) in writes {
            let backend = Arc::clone(&self.backend);
            let path = object_path(&mount.name, segment.as_str(), &name);
            operations.push(Box::pin(write_role(backend, path, data)));
        }

        for name in deletes {
            let backend = Arc::clone(&self.backend);
            let path = object_path(&mount.name, segment.as_str(), &name);
            operations.push(Box::pin(async move {
                debug!(role = %name, path = %path, "deleting auth role");
                backend
                    .delete(&path)
                    .await
                    .map_err(|e| RemoteError::Delete(path, e))
            }));
        }

        self.executor
            .run(operations)
            .await
            .map_err(|e| ApplyError::Roles(mount.name.clone(), e))?;

        Ok(counts)
    }

    /// Await a remote call unless the apply is cancelled first.
    async fn remote<T, F>(&self, call: F) -> Result<T, ApplyError<B::Error>>
    where
        F: Future<Output = T>,
    {
        let cancel = self.executor.cancel_token();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApplyError::Cancelled),
            out = call => Ok(out),
        }
    }
}

async fn write_role<B: Backend>(
    backend: Arc<B>,
    path: String,
    data: Document,
) -> Result<(), RemoteError<B::Error>> {
    debug!(path = %path, "writing auth role");
    backend
        .write(&path, &data)
        .await
        .map_err(|e| RemoteError::Write(path, e))
}
