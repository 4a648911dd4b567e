use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{AuthMount, Backend, Document};

const POLICY_ROOT: &str = "sys/policies/acl";
const AUTH_ROOT: &str = "sys/auth";

/// Key under which calls and failures for a policy are tracked
pub fn policy_key(name: &str) -> String {
    format!("{}/{}", POLICY_ROOT, name)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryBackendError {
    #[error("injected failure at {0}")]
    Injected(String),
}

/// In-memory backend, cheap to clone; clones share state.
///
/// A fresh backend holds the `root` and `default` policies, like a
///  freshly initialized server.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryBackendInner>>,
}

#[derive(Debug, Default)]
struct MemoryBackendInner {
    /// policy name -> raw body
    policies: BTreeMap<String, String>,
    /// mount name -> declared type
    mounts: BTreeMap<String, String>,
    /// full object path -> body
    objects: BTreeMap<String, Document>,
    /// path -> number of calls that touched it
    calls: HashMap<String, usize>,
    /// paths whose calls fail
    failures: BTreeSet<String>,
    /// simulated latency of every mutation
    latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::empty()
            .with_policy("root", "")
            .with_policy("default", "path \"auth/token/lookup-self\" {\n  capabilities = [\"read\"]\n}\n")
    }

    /// A backend with no policies at all
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryBackendInner::default())),
        }
    }

    pub fn with_policy(self, name: &str, body: &str) -> Self {
        self.inner
            .lock()
            .policies
            .insert(name.to_string(), body.to_string());
        self
    }

    pub fn with_mount(self, name: &str, kind: &str) -> Self {
        self.inner
            .lock()
            .mounts
            .insert(name.to_string(), kind.to_string());
        self
    }

    /// Seed an object. Panics if `data` is not a JSON object.
    pub fn with_object(self, path: &str, data: Value) -> Self {
        let Value::Object(data) = data else {
            panic!("object at {} must be a JSON object", path);
        };
        self.inner.lock().objects.insert(path.to_string(), data);
        self
    }

    /// Every call touching `path` fails from now on
    pub fn fail_on(&self, path: impl Into<String>) {
        self.inner.lock().failures.insert(path.into());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Delay every write and delete by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Number of calls that touched `path`
    pub fn calls(&self, path: &str) -> usize {
        self.inner.lock().calls.get(path).copied().unwrap_or(0)
    }

    /// Highest number of writes and deletes observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().max_in_flight
    }

    pub fn policy(&self, name: &str) -> Option<String> {
        self.inner.lock().policies.get(name).cloned()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.inner.lock().policies.keys().cloned().collect()
    }

    pub fn object(&self, path: &str) -> Option<Document> {
        self.inner.lock().objects.get(path).cloned()
    }

    /// Names of objects directly under `path`
    pub fn object_names(&self, path: &str) -> Vec<String> {
        children(&self.inner.lock().objects, path)
    }

    /// Record a call and fail it if it was asked to.
    fn observe(&self, path: &str) -> Result<(), MemoryBackendError> {
        let mut inner = self.inner.lock();
        *inner.calls.entry(path.to_string()).or_insert(0) += 1;
        if inner.failures.contains(path) {
            return Err(MemoryBackendError::Injected(path.to_string()));
        }
        Ok(())
    }

    /// Record a mutation, hold it in flight for the configured latency,
    ///  then apply `f` unless the path is set to fail.
    async fn mutate<F>(&self, path: &str, f: F) -> Result<(), MemoryBackendError>
    where
        F: FnOnce(&mut MemoryBackendInner),
    {
        let latency = {
            let mut inner = self.inner.lock();
            *inner.calls.entry(path.to_string()).or_insert(0) += 1;
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        inner.in_flight -= 1;
        if inner.failures.contains(path) {
            return Err(MemoryBackendError::Injected(path.to_string()));
        }
        f(&mut inner);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn children(objects: &BTreeMap<String, Document>, path: &str) -> Vec<String> {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    objects
        .keys()
        .filter_map(|key| key.strip_prefix(&prefix))
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Backend for MemoryBackend {
    type Error = MemoryBackendError;

    async fn list_policies(&self) -> Result<Vec<String>, Self::Error> {
        self.observe(POLICY_ROOT)?;
        Ok(self.policy_names())
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, Self::Error> {
        self.observe(&policy_key(name))?;
        Ok(self.policy(name))
    }

    async fn write_policy(&self, name: &str, body: &str) -> Result<(), Self::Error> {
        self.mutate(&policy_key(name), |inner| {
            inner.policies.insert(name.to_string(), body.to_string());
        })
        .await
    }

    async fn delete_policy(&self, name: &str) -> Result<(), Self::Error> {
        self.mutate(&policy_key(name), |inner| {
            inner.policies.remove(name);
        })
        .await
    }

    async fn list_auth_mounts(&self) -> Result<Vec<AuthMount>, Self::Error> {
        self.observe(AUTH_ROOT)?;
        let inner = self.inner.lock();
        Ok(inner
            .mounts
            .iter()
            .map(|(name, kind)| AuthMount::new(format!("{}/", name), kind.clone()))
            .collect())
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Self::Error> {
        self.observe(path)?;
        let names = self.object_names(path);
        if names.is_empty() {
            return Ok(None);
        }
        Ok(Some(names))
    }

    async fn read(&self, path: &str) -> Result<Option<Document>, Self::Error> {
        self.observe(path)?;
        Ok(self.object(path))
    }

    async fn write(&self, path: &str, data: &Document) -> Result<(), Self::Error> {
        self.mutate(path, |inner| {
            inner.objects.insert(path.to_string(), data.clone());
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), Self::Error> {
        self.mutate(path, |inner| {
            inner.objects.remove(path);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fresh_backend_has_builtin_policies() {
        let backend = MemoryBackend::new();
        let policies = backend.list_policies().await.unwrap();
        assert_eq!(policies, vec!["default".to_string(), "root".to_string()]);
    }

    #[tokio::test]
    async fn test_mount_names_reported_with_separator_normalized() {
        let backend = MemoryBackend::empty().with_mount("approle", "approle");
        let mounts = backend.list_auth_mounts().await.unwrap();
        assert_eq!(mounts, vec![AuthMount::new("approle", "approle")]);
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let backend = MemoryBackend::empty()
            .with_object("auth/a/role/r1", json!({}))
            .with_object("auth/a/role/r2", json!({}))
            .with_object("auth/a/role/r2/secret-id/x", json!({}))
            .with_object("auth/b/role/r3", json!({}));

        let names = backend.list("auth/a/role").await.unwrap().unwrap();
        assert_eq!(names, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(backend.list("auth/c/role").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_failure_still_counts_call() {
        let backend = MemoryBackend::empty();
        backend.fail_on(policy_key("p1"));

        let err = backend.write_policy("p1", "body").await.unwrap_err();
        assert_eq!(err, MemoryBackendError::Injected(policy_key("p1")));
        assert_eq!(backend.calls(&policy_key("p1")), 1);
        assert!(backend.policy("p1").is_none());

        backend.clear_failures();
        backend.write_policy("p1", "body").await.unwrap();
        assert_eq!(backend.policy("p1").as_deref(), Some("body"));
        assert_eq!(backend.calls(&policy_key("p1")), 2);
    }
}
