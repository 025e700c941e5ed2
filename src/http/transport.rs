use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use super::substitute::PreparedRequest;
use crate::config::EngineConfig;
use crate::errors::BlindsightError;

/// A response as the oracles see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Wall-clock time from send to last body byte.
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Sends prepared requests. Implementations must be shareable across workers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, BlindsightError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, BlindsightError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        let client = builder
            .build()
            .map_err(|e| BlindsightError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, BlindsightError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| BlindsightError::InvalidTarget(format!("Invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;
        let elapsed = start.elapsed();

        trace!(status, elapsed_ms = elapsed.as_millis() as u64, url = %request.url, "Response received");
        Ok(HttpResponse { status, headers, body, elapsed })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> BlindsightError {
    if e.is_timeout() {
        BlindsightError::Timeout(e.to_string())
    } else if e.is_builder() {
        BlindsightError::InvalidTarget(e.to_string())
    } else {
        BlindsightError::Network(e.to_string())
    }
}
