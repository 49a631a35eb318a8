//! Infrastructure provider client.
//!
//! The garbage collector only needs one question answered: does the
//! provider still have a resource with this id? [`CloudProvider`] is that
//! question; [`HttpProvider`] asks it of an HTTP inventory endpoint.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;

/// A resource as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInstance {
    pub provider_id: String,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Read access to the provider's ground truth.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Look up a resource. Absence is [`ProviderError::NotFound`].
    async fn get(&self, provider_id: &str) -> Result<ProviderInstance, ProviderError>;
}

/// Provider client speaking to an inventory service over HTTP/1.1.
///
/// `GET {path_prefix}/{provider_id}`: 2xx carries a JSON
/// [`ProviderInstance`], 404 means not found, anything else is an error.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    /// `host:port` of the inventory service.
    address: String,
    path_prefix: String,
    timeout: Duration,
}

impl HttpProvider {
    pub fn new(address: &str, path_prefix: &str, timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            path_prefix: path_prefix.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Origin-form request target; the provider id is a single segment.
    fn path_for(&self, provider_id: &str) -> String {
        format!("{}/{}", self.path_prefix, urlencoding::encode(provider_id))
    }

    async fn fetch(&self, provider_id: &str) -> Result<ProviderInstance, ProviderError> {
        let path = self.path_for(provider_id);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| ProviderError::Request(format!("connecting to {}: {e}", self.address)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProviderError::Request(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", &self.address)
            .header("accept", "application/json")
            .header("user-agent", "nodecycle-gc/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProviderError::Request(format!("building request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProviderError::Request(format!("sending request: {e}")))?;

        let status = resp.status();
        if status == http::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(provider_id.to_string()));
        }
        if !status.is_success() {
            debug!(%status, address = %self.address, %path, "provider returned non-2xx");
            return Err(ProviderError::Request(format!("unexpected status {status}")));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProviderError::Request(format!("reading body: {e}")))?
            .to_bytes();
        serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Request(format!("decoding instance: {e}")))
    }
}

#[async_trait]
impl CloudProvider for HttpProvider {
    async fn get(&self, provider_id: &str) -> Result<ProviderInstance, ProviderError> {
        match tokio::time::timeout(self.timeout, self.fetch(provider_id)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%provider_id, "provider lookup timed out");
                Err(ProviderError::Timeout)
            }
        }
    }
}
