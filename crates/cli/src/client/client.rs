use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use common::backend::{AuthMount, Backend, Document};

use super::error::ApiError;
use crate::config::ClientConfig;

const POLICY_ROOT: &str = "sys/policies/acl";

/// Standard Vault response envelope; only `data` matters here
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Keys {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyBody {
    policy: String,
}

#[derive(Debug, Deserialize)]
struct MountInfo {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Vault HTTP API client.
///
/// Stateless apart from the underlying connection pool, so one instance
///  is shared across every concurrent reconciliation worker.
#[derive(Debug, Clone)]
pub struct VaultClient {
    pub remote: Url,
    client: Client,
}

impl VaultClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(token)?;
            value.set_sensitive(true);
            default_headers.insert("X-Vault-Token", value);
        }
        if let Some(namespace) = &config.namespace {
            default_headers.insert("X-Vault-Namespace", HeaderValue::from_str(namespace)?);
        }
        let client = Client::builder().default_headers(default_headers).build()?;

        // keep the base reading as a directory; `url_with` drops the empty tail
        let mut remote = config.address.clone();
        if !remote.path().ends_with('/') {
            let path = format!("{}/", remote.path());
            remote.set_path(&path);
        }

        Ok(Self { remote, client })
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// URL for an API path. Each `/`-separated part is percent-encoded
    ///  as its own segment, so names never leak into the query or fragment.
    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.url_with(path, None)
    }

    /// URL for one policy; the name is a single segment even if it holds a `/`
    fn policy_url(&self, name: &str) -> Result<Url, ApiError> {
        self.url_with(POLICY_ROOT, Some(name))
    }

    fn url_with(&self, path: &str, name: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.remote.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::BaseAddress(self.remote.to_string()))?;
            segments
                .pop_if_empty()
                .push("v1")
                .extend(path.split('/').filter(|s| !s.is_empty()));
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    /// Like `send`, but a 404 is `None`
    async fn send_optional(&self, request: RequestBuilder) -> Result<Option<Response>, ApiError> {
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status().is_success() {
            return Ok(Some(response));
        }
        Err(error_from_response(response).await)
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let Some(response) = self.send_optional(request).await? else {
            return Ok(None);
        };
        // 204 carries no body
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    async fn list_keys(&self, path: &str) -> Result<Option<Vec<String>>, ApiError> {
        let request = self
            .client
            .get(self.url(path)?)
            .query(&[("list", "true")]);
        let keys: Option<Keys> = self.get_data(request).await?;
        Ok(keys.map(|k| k.keys))
    }
}

async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ApiError::Reqwest(e),
    };
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) if !body.errors.is_empty() => ApiError::Vault(status, body.errors),
        _ => ApiError::HttpStatus(status, text),
    }
}

#[async_trait]
impl Backend for VaultClient {
    type Error = ApiError;

    async fn list_policies(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.list_keys(POLICY_ROOT).await?.unwrap_or_default())
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, Self::Error> {
        let request = self
            .client
            .get(self.policy_url(name)?);
        let body: Option<PolicyBody> = self.get_data(request).await?;
        Ok(body.map(|b| b.policy))
    }

    async fn write_policy(&self, name: &str, body: &str) -> Result<(), Self::Error> {
        let request = self
            .client
            .put(self.policy_url(name)?)
            .json(&serde_json::json!({ "policy": body }));
        self.send(request).await?;
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), Self::Error> {
        let request = self
            .client
            .delete(self.policy_url(name)?);
        self.send(request).await?;
        Ok(())
    }

    async fn list_auth_mounts(&self) -> Result<Vec<AuthMount>, Self::Error> {
        let request = self.client.get(self.url("sys/auth")?);
        let mounts: Option<BTreeMap<String, MountInfo>> = self.get_data(request).await?;
        Ok(mounts
            .unwrap_or_default()
            .into_iter()
            .map(|(name, info)| AuthMount::new(name, info.kind))
            .collect())
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Self::Error> {
        self.list_keys(path).await
    }

    async fn read(&self, path: &str) -> Result<Option<Document>, Self::Error> {
        let request = self.client.get(self.url(path)?);
        self.get_data(request).await
    }

    async fn write(&self, path: &str, data: &Document) -> Result<(), Self::Error> {
        let request = self.client.put(self.url(path)?).json(data);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), Self::Error> {
        let request = self.client.delete(self.url(path)?);
        self.send(request).await?;
        Ok(())
    }
}
