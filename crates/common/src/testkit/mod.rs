/// Lightweight in-process stand-in for the live server
///
/// `MemoryBackend` implements `Backend` over a few maps, so the
/// reconciler and downloader can be exercised without a running
/// server. It also records what was asked of it: per-path call counts,
/// injected failures, and the highest number of concurrent mutations.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use common::testkit::MemoryBackend;
/// use common::reconcile::Reconciler;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::test]
/// async fn test_apply() {
///     let backend = Arc::new(
///         MemoryBackend::new()
///             .with_policy("stale", "path \"x\" {}")
///             .with_mount("approle", "approle"),
///     );
///
///     let reconciler = Reconciler::new(backend.clone(), CancellationToken::new());
///     reconciler.apply(&auth_dir, &policy_dir).await.unwrap();
///
///     assert!(backend.policy("stale").is_none());
/// }
/// ```
mod memory;

pub use memory::{policy_key, MemoryBackend, MemoryBackendError};
