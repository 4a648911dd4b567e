pub mod apply;
pub mod download;
pub mod version;

pub use apply::Apply;
pub use download::Download;
pub use version::Version;
