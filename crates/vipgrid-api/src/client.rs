//! Minimal HTTP/1 client for the membership API, used by `vipd node` and
//! `vipd status`.

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use vipgrid_state::Node;

use crate::handlers::RegisterRequest;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach daemon at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The daemon answered with `success: false`.
    #[error("daemon returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Talks to one daemon at `host:port`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    address: String,
}

impl ApiClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub async fn list_nodes(&self) -> ClientResult<Vec<Node>> {
        self.request(Method::GET, "/api/v1/nodes".to_string(), None)
            .await
    }

    pub async fn get_node(&self, id: &str) -> ClientResult<Node> {
        self.request(Method::GET, format!("/api/v1/nodes/{id}"), None)
            .await
    }

    pub async fn register_node(&self, id: &str, attachment: &str) -> ClientResult<Node> {
        let body = serde_json::to_vec(&RegisterRequest {
            id: id.to_string(),
            attachment: attachment.to_string(),
        })?;
        self.request(Method::POST, "/api/v1/nodes".to_string(), Some(body))
            .await
    }

    pub async fn remove_node(&self, id: &str) -> ClientResult<()> {
        let _: String = self
            .request(Method::DELETE, format!("/api/v1/nodes/{id}"), None)
            .await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        body: Option<Vec<u8>>,
    ) -> ClientResult<T> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|source| ClientError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "api connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header("host", &self.address)
            .header("user-agent", "vipd/0.1");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        let resp = sender.send_request(req).await?;
        let status = resp.status();
        let bytes = resp.into_body().collect().await?.to_bytes();
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;

        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_else(|| status.to_string()),
            }),
        }
    }
}
