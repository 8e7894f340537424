//! Endpoint selection by URL scheme.

use async_trait::async_trait;
use tracing::info;
use url::Url;

use cadence_core::error::{ChainError, ChainResult};
use cadence_core::ports::{BlockSource, RawBlock};

use crate::hydra::{HydraClient, HydraClientConfig};
use crate::node::{SubstrateClient, SubstrateClientConfig};

/// Which adapter a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// `http(s)://` - Hydra indexer GraphQL API.
    Hydra,
    /// `ws(s)://` - Substrate node RPC.
    Node,
}

impl EndpointKind {
    pub fn from_url(raw: &str) -> ChainResult<(Self, Url)> {
        let url = Url::parse(raw)
            .map_err(|e| ChainError::ConnectionFailed(format!("invalid endpoint {raw:?}: {e}")))?;
        let kind = match url.scheme() {
            "http" | "https" => EndpointKind::Hydra,
            "ws" | "wss" => EndpointKind::Node,
            other => {
                return Err(ChainError::ConnectionFailed(format!(
                    "unsupported endpoint scheme {other:?}, expected http(s) or ws(s)"
                )));
            }
        };
        Ok((kind, url))
    }
}

/// Either block source, chosen at startup.
pub enum Endpoint {
    Hydra(HydraClient),
    Node(SubstrateClient),
}

impl Endpoint {
    /// Connect to the endpoint a URL names.
    pub async fn connect(raw: &str) -> ChainResult<Self> {
        let (kind, url) = EndpointKind::from_url(raw)?;
        info!(kind = ?kind, host = url.host_str().unwrap_or_default(), "🔗 Connecting to indexer endpoint");

        match kind {
            EndpointKind::Hydra => Ok(Endpoint::Hydra(HydraClient::new(HydraClientConfig {
                url: url.into(),
                ..Default::default()
            })?)),
            EndpointKind::Node => Ok(Endpoint::Node(
                SubstrateClient::connect(SubstrateClientConfig { ws_url: url.into() }).await?,
            )),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        match self {
            Endpoint::Hydra(_) => EndpointKind::Hydra,
            Endpoint::Node(_) => EndpointKind::Node,
        }
    }
}

#[async_trait]
impl BlockSource for Endpoint {
    async fn fetch_block(&self, height: u64) -> ChainResult<Option<RawBlock>> {
        match self {
            Endpoint::Hydra(client) => client.fetch_block(height).await,
            Endpoint::Node(client) => client.fetch_block(height).await,
        }
    }

    async fn head(&self) -> ChainResult<u64> {
        match self {
            Endpoint::Hydra(client) => client.head().await,
            Endpoint::Node(client) => client.head().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selects_adapter() {
        let kind = |raw| EndpointKind::from_url(raw).map(|(k, _)| k).ok();
        assert_eq!(kind("http://localhost:4001/graphql"), Some(EndpointKind::Hydra));
        assert_eq!(kind("https://indexer.example/graphql"), Some(EndpointKind::Hydra));
        assert_eq!(kind("ws://127.0.0.1:9944"), Some(EndpointKind::Node));
        assert_eq!(kind("wss://rpc.example"), Some(EndpointKind::Node));
        assert_eq!(kind("ftp://example"), None);
        assert_eq!(kind("not a url"), None);
    }

    #[tokio::test]
    async fn test_hydra_connect_is_lazy() {
        let endpoint = Endpoint::connect("http://127.0.0.1:1/graphql").await.unwrap();
        assert_eq!(endpoint.kind(), EndpointKind::Hydra);
    }
}
