#[allow(clippy::module_inception)]
mod client;
mod error;

pub use client::VaultClient;
pub use error::{describe_api_error, find_api_error, ApiError};
