//! Vault HTTP API backend.
//!
//! Maps the three backend operations onto the Vault HTTP API:
//!
//! | Operation | Request | Absent |
//! |-----------|---------|--------|
//! | read | `GET /v1/{path}` → `data` object | `404` → `Ok(None)` |
//! | write | `POST /v1/{path}` with the document as body | n/a |
//! | delete | `DELETE /v1/{path}` | `404` → `Ok(())` |
//!
//! Any transport failure or other non-success status is reported as
//! [`Error::BackendUnavailable`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{Document, SecretBackend};
use crate::config::VaultConfig;
use crate::{Error, Result};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Backend speaking the Vault HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<Document>,
}

impl HttpBackend {
    /// Build a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the address is not a valid
    /// URL or the HTTP client cannot be built.
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let mut base = Url::parse(&config.address).map_err(|e| {
            Error::InvalidConfiguration(format!("invalid vault address '{}': {e}", config.address))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: config.resolved_token(),
            namespace: config.namespace.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let relative = format!("v1/{}", path.trim_start_matches('/'));
        self.base
            .join(&relative)
            .map_err(|e| Error::InvalidConfiguration(format!("invalid backend path '{path}': {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, self.url(path)?);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.namespace {
            builder = builder.header(NAMESPACE_HEADER, namespace);
        }
        Ok(builder)
    }
}

async fn send(builder: RequestBuilder, op: &str, path: &str) -> Result<reqwest::Response> {
    builder
        .send()
        .await
        .map_err(|e| Error::BackendUnavailable(format!("{op} {path}: {e}")))
}

async fn failure(response: reqwest::Response, op: &str, path: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::BackendUnavailable(format!("{op} {path} failed: {status} {body}"))
}

#[async_trait]
impl SecretBackend for HttpBackend {
    async fn read(&self, path: &str) -> Result<Option<Document>> {
        let response = send(self.request(Method::GET, path)?, "read", path).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(path, "Backend read: absent");
                Ok(None)
            }
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| Error::BackendUnavailable(format!("read {path}: {e}")))?;
                let parsed: ReadResponse = serde_json::from_str(&body).map_err(|e| {
                    Error::BackendUnavailable(format!(
                        "failed to decode read response for {path}: {e}; body={body}"
                    ))
                })?;
                debug!(path, "Backend read");
                Ok(Some(parsed.data.unwrap_or_default()))
            }
            _ => Err(failure(response, "read", path).await),
        }
    }

    async fn write(&self, path: &str, document: &Document) -> Result<()> {
        let response = send(
            self.request(Method::POST, path)?.json(document),
            "write",
            path,
        )
        .await?;
        if response.status().is_success() {
            debug!(path, "Backend write");
            Ok(())
        } else {
            Err(failure(response, "write", path).await)
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = send(self.request(Method::DELETE, path)?, "delete", path).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(path, %status, "Backend delete");
            Ok(())
        } else {
            Err(failure(response, "delete", path).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(address: &str) -> VaultConfig {
        VaultConfig {
            address: address.to_string(),
            token: Some("root".to_string()),
            namespace: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn builds_api_urls() {
        let backend = HttpBackend::new(&config("http://127.0.0.1:8200")).unwrap();
        assert_eq!(
            backend.url("auth/cert/certs/team5-app1-production").unwrap().as_str(),
            "http://127.0.0.1:8200/v1/auth/cert/certs/team5-app1-production"
        );
    }

    #[test]
    fn keeps_address_path_prefix() {
        let backend = HttpBackend::new(&config("https://vault.example.com/proxy")).unwrap();
        assert_eq!(
            backend.url("/sys/policy/p").unwrap().as_str(),
            "https://vault.example.com/proxy/v1/sys/policy/p"
        );
    }

    #[test]
    fn rejects_invalid_address() {
        let err = HttpBackend::new(&config("not a url")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_backend_unavailable() {
        // GIVEN: nothing listens on port 9 (discard) on localhost
        let mut cfg = config("http://127.0.0.1:9");
        cfg.timeout = Duration::from_millis(500);
        let backend = HttpBackend::new(&cfg).unwrap();

        // WHEN: read
        let err = backend.read("auth/cert/certs/x").await.unwrap_err();

        // THEN: transport failure surfaces as BackendUnavailable
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
