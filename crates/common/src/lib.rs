/**
 * The seam between the reconciliation engine and
 *  whatever speaks to the live server. Everything
 *  in this crate is generic over a `Backend`.
 */
pub mod backend;
/**
 * Name -> content diffing for a single object
 *  category (policies, or one mount's roles).
 */
pub mod diff;
/**
 * Download direction: materialize live server
 *  state into a local tree.
 */
pub mod download;
/**
 * Fan-out / fan-in of remote mutations with a
 *  fixed ceiling on in-flight operations.
 */
pub mod executor;
/**
 * Reading and writing the on-disk tree of
 *  policies and auth roles.
 */
pub mod local_tree;
/**
 * Closed mapping from auth mount type to the
 *  path segment holding its role-like objects.
 */
pub mod mount_kind;
/**
 * Apply direction: push a local tree to the
 *  live server, deleting what isn't declared.
 */
pub mod reconcile;
/**
 * In-memory backend for tests. Enabled by the
 *  `testkit` feature.
 */
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub mod prelude {
    pub use crate::backend::{AuthMount, Backend, Document, RemoteError};
    pub use crate::diff::{plan, Plan, PROTECTED_POLICIES};
    pub use crate::download::{DownloadError, DownloadSummary, Downloader};
    pub use crate::executor::{BatchError, BoundedExecutor, Operation, MAX_IN_FLIGHT};
    pub use crate::local_tree::{LocalTree, LocalTreeError};
    pub use crate::mount_kind::{MountKind, RoleSegment};
    pub use crate::reconcile::{ApplyError, ApplySummary, Reconciler};
}
