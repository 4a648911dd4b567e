//! Shared test utilities for reconciliation integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::local_tree::LocalTree;
use common::reconcile::{ApplyError, ApplySummary, Reconciler};
use common::testkit::{MemoryBackend, MemoryBackendError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A checked-out tree in a temp directory
pub struct TestTree {
    pub temp: TempDir,
    pub tree: LocalTree,
}

impl TestTree {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let tree = LocalTree::new(temp.path());
        Self { temp, tree }
    }

    pub fn policy_dir(&self) -> PathBuf {
        self.tree.policy_dir()
    }

    pub fn auth_dir(&self) -> PathBuf {
        self.tree.auth_dir()
    }

    pub fn add_policy(&self, name: &str, body: &str) -> PathBuf {
        write(&self.policy_dir().join(name), body)
    }

    pub fn add_role(&self, mount: &str, segment: &str, name: &str, body: &str) -> PathBuf {
        write(&self.auth_dir().join(mount).join(segment).join(name), body)
    }

    pub fn remove(&self, path: &Path) {
        fs::remove_file(path).unwrap();
    }
}

fn write(path: &Path, body: &str) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
    path.to_path_buf()
}

/// Run a full apply of `tree` against `backend`
pub async fn apply(
    backend: &Arc<MemoryBackend>,
    tree: &TestTree,
) -> Result<ApplySummary, ApplyError<MemoryBackendError>> {
    Reconciler::new(backend.clone(), CancellationToken::new())
        .apply(&tree.auth_dir(), &tree.policy_dir())
        .await
}
