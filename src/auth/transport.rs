//! HTTP transport seam.
//!
//! The token client and gateway talk to the platform through this trait so
//! the whole auth stack can be exercised in tests with scripted replies. The
//! production implementation wraps a shared `reqwest` client.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// A raw HTTP reply: status plus the unparsed body.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST an `application/x-www-form-urlencoded` body.
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError>;

    /// GET with a bearer token and query parameters.
    async fn get(
        &self,
        url: &str,
        bearer: &str,
        params: &[(String, String)],
    ) -> Result<HttpReply, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitedocs-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self::new(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError> {
        let response = self.client.post(url).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }

    async fn get(
        &self,
        url: &str,
        bearer: &str,
        params: &[(String, String)],
    ) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .query(params)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}
