use std::error::Error as StdError;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Vault address cannot be used as a base URL: {0}")]
    BaseAddress(String),
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    /// Error response carrying Vault's `errors` list
    #[error("HTTP status {}: {}", .0, .1.join("; "))]
    Vault(StatusCode, Vec<String>),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::HttpStatus(status, _) | ApiError::Vault(status, _) => Some(*status),
            ApiError::Reqwest(e) => e.status(),
            _ => None,
        }
    }

    fn is_connection_failure(&self) -> bool {
        let ApiError::Reqwest(e) = self else {
            return false;
        };
        if e.is_connect() {
            return true;
        }
        let chain = error_chain(e);
        chain.contains("connection refused")
            || chain.contains("Connection refused")
            || chain.contains("no such host")
            || chain.contains("dns error")
    }
}

/// Render an error and all its sources as one line
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        rendered.push_str(": ");
        rendered.push_str(&e.to_string());
        source = e.source();
    }
    rendered
}

/// Find the first `ApiError` in an error's source chain.
pub fn find_api_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ApiError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return Some(api);
        }
        current = e.source();
    }
    None
}

/// A user-facing explanation of an API failure.
pub fn describe_api_error(err: &ApiError) -> String {
    match err {
        ApiError::Vault(_, errors) if !errors.is_empty() => {
            format!("Vault API error: {}", errors.join("; "))
        }
        e if e.is_connection_failure() => format!(
            "Vault connection error: {}. Ensure VAULT_ADDR is correct and Vault is running.",
            error_chain(e)
        ),
        e => format!("Vault operation failed: {}", e),
    }
}
