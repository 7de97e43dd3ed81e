//! Server endpoint discovery
//!
//! The control core only needs `resolve()`; the mechanism behind it is
//! swappable: static configuration, an HTTP probe sweep, mDNS, anything
//! that yields a connectable URL.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::LinkError;

#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Resolve the server endpoint to a connectable link URL.
    async fn resolve(&self) -> Result<String, LinkError>;
}

/// Fixed endpoint from configuration.
pub struct StaticResolver {
    url: String,
}

impl StaticResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self) -> Result<String, LinkError> {
        Ok(self.url.clone())
    }
}

/// Probes candidate hosts' health endpoints and picks the first match.
pub struct ProbeResolver {
    client: reqwest::Client,
    candidates: Vec<String>,
    port: u16,
    marker: String,
}

impl ProbeResolver {
    pub fn new(candidates: Vec<String>, port: u16, probe_timeout: Duration, marker: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(probe_timeout)
                .build()
                .unwrap_or_default(),
            candidates,
            port,
            marker,
        }
    }

    /// Is our server answering at this host? Auth-protected deployments
    /// answer 401/403 from the right service, so those count as hits;
    /// a 200 must carry the marker in its body to rule out unrelated
    /// services on the same port.
    async fn probe(&self, host: &str) -> bool {
        let url = format!("http://{host}:{}/health", self.port);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(_) => return false,
        };

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => true,
            StatusCode::OK => match response.text().await {
                Ok(body) => body.contains(&self.marker),
                Err(_) => false,
            },
            _ => false,
        }
    }
}

#[async_trait]
impl EndpointResolver for ProbeResolver {
    async fn resolve(&self) -> Result<String, LinkError> {
        for host in &self.candidates {
            tracing::debug!(%host, "probing candidate host");
            if self.probe(host).await {
                let url = format!("ws://{host}:{}/ws", self.port);
                tracing::info!(%url, "server discovered");
                return Ok(url);
            }
        }
        tracing::warn!("endpoint discovery exhausted all candidates");
        Err(LinkError::NoEndpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_returns_configured_url() {
        let resolver = StaticResolver::new("ws://10.0.0.5:8000/ws");
        assert_eq!(resolver.resolve().await.unwrap(), "ws://10.0.0.5:8000/ws");
    }

    #[tokio::test]
    async fn test_probe_resolver_with_no_candidates_fails() {
        let resolver = ProbeResolver::new(
            Vec::new(),
            8000,
            Duration::from_millis(100),
            "models".to_string(),
        );
        assert!(matches!(
            resolver.resolve().await,
            Err(LinkError::NoEndpoint)
        ));
    }
}
