use async_trait::async_trait;

/// Structured body of a role-like object: an arbitrary JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// An authentication method attached to the server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AuthMount {
    /// Mount path without its trailing separator, e.g. `approle`
    pub name: String,
    /// Declared mount type, e.g. `approle`, `kubernetes`
    pub kind: String,
}

impl AuthMount {
    /// Build a mount, stripping the trailing `/` the server reports
    ///  on mount paths.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.trim_end_matches('/').to_string();
        Self {
            name,
            kind: kind.into(),
        }
    }
}

/// Remote path of the collection holding a mount's role-like objects
pub fn collection_path(mount: &str, segment: &str) -> String {
    format!("auth/{}/{}", mount, segment)
}

/// Remote path of a single role-like object
pub fn object_path(mount: &str, segment: &str, name: &str) -> String {
    format!("auth/{}/{}/{}", mount, segment, name)
}

/// A single remote call that failed, with the object it targeted.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError<E> {
    #[error("error writing {0}: {1}")]
    Write(String, #[source] E),
    #[error("error deleting {0}: {1}")]
    Delete(String, #[source] E),
    #[error("error reading {0}: {1}")]
    Read(String, #[source] E),
}

/// The control-plane API the reconciler drives.
///
/// Implementations must be safe to share across concurrent workers;
///  the reconciler hands out clones of an `Arc<B>` and never holds
///  local mutable state on the backend's behalf.
///
/// Listing and reading distinguish "absent" (`Ok(None)`) from failure.
///  An absent listing is treated as an empty collection by callers.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Names of every ACL policy on the server
    async fn list_policies(&self) -> Result<Vec<String>, Self::Error>;

    /// Raw body of a policy, or `None` if it doesn't exist
    async fn read_policy(&self, name: &str) -> Result<Option<String>, Self::Error>;

    /// Create or replace a policy with a raw body
    async fn write_policy(&self, name: &str, body: &str) -> Result<(), Self::Error>;

    async fn delete_policy(&self, name: &str) -> Result<(), Self::Error>;

    /// Every enabled auth method, names already normalized
    async fn list_auth_mounts(&self) -> Result<Vec<AuthMount>, Self::Error>;

    /// Names directly under `path`, or `None` if nothing is there
    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Self::Error>;

    /// Structured object at `path`, or `None` if it doesn't exist
    async fn read(&self, path: &str) -> Result<Option<Document>, Self::Error>;

    /// Create or replace the object at `path`
    async fn write(&self, path: &str, data: &Document) -> Result<(), Self::Error>;

    async fn delete(&self, path: &str) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_name_trailing_separator_trimmed() {
        let mount = AuthMount::new("approle/", "approle");
        assert_eq!(mount.name, "approle");
        assert_eq!(mount.kind, "approle");
    }

    #[test]
    fn test_mount_name_without_separator_unchanged() {
        let mount = AuthMount::new("team/k8s", "kubernetes");
        assert_eq!(mount.name, "team/k8s");
    }

    #[test]
    fn test_paths() {
        assert_eq!(collection_path("my-approle", "role"), "auth/my-approle/role");
        assert_eq!(
            object_path("my-approle", "role", "r1"),
            "auth/my-approle/role/r1"
        );
    }
}
