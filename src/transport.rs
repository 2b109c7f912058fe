use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, COOKIE};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::status::StatusPayload;

/// Requests the panel makes against the monitored server.
#[async_trait]
pub trait StatusTransport: Send + Sync {
    /// Fetch the current status payload
    async fn fetch_status(&self) -> anyhow::Result<StatusPayload>;

    /// Tell the server to end the session
    async fn fetch_logout(&self) -> anyhow::Result<()>;
}

/// Plain HTTP transport built on the hyper-util client.
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    status_url: Uri,
    logout_url: Uri,
    cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(upstream: &UpstreamConfig) -> anyhow::Result<Self> {
        let status_url = upstream
            .status_url
            .parse()
            .with_context(|| format!("Invalid status URL {}", upstream.status_url))?;
        let logout_url = upstream
            .logout_url
            .parse()
            .with_context(|| format!("Invalid logout URL {}", upstream.logout_url))?;

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            status_url,
            logout_url,
            cookie: upstream.cookie.clone(),
        })
    }

    async fn get(&self, uri: &Uri) -> anyhow::Result<Bytes> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .header(ACCEPT, "application/json");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie.as_str());
        }
        let req = builder.body(Full::new(Bytes::new()))?;

        let res = self
            .client
            .request(req)
            .await
            .with_context(|| format!("GET {} failed", uri))?;
        let status = res.status();
        if !status.is_success() {
            bail!("GET {} returned {}", uri, status);
        }

        let body = res
            .into_body()
            .collect()
            .await
            .with_context(|| format!("Failed to read body from {}", uri))?
            .to_bytes();
        debug!(url = %uri, bytes = body.len(), "response received");
        Ok(body)
    }
}

#[async_trait]
impl StatusTransport for HttpTransport {
    async fn fetch_status(&self) -> anyhow::Result<StatusPayload> {
        let body = self.get(&self.status_url).await?;
        serde_json::from_slice(&body).context("Malformed status payload")
    }

    async fn fetch_logout(&self) -> anyhow::Result<()> {
        self.get(&self.logout_url).await.map(|_| ())
    }
}
