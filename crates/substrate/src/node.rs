//! Substrate node client with dynamic metadata decoding.

use std::sync::Arc;

use async_trait::async_trait;
use subxt::backend::legacy::{LegacyBackend, LegacyRpcMethods};
use subxt::backend::rpc::RpcClient;
use subxt::blocks::Block;
use subxt::events::{Events, Phase};
use subxt::{OnlineClient, PolkadotConfig};
use tracing::{debug, instrument, trace};

use cadence_core::error::{ChainError, ChainResult};
use cadence_core::metrics::record_decode_error;
use cadence_core::models::BlockHash;
use cadence_core::ports::{BlockSource, RawBlock, RawEvent, RawExtrinsic};

use crate::scale::{composite_to_json, positional_fields, timestamp_from_args};

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
}

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
        }
    }
}

pub type SubstrateBlock = Block<PolkadotConfig, OnlineClient<PolkadotConfig>>;

/// Block source reading straight from a node.
///
/// Uses the legacy RPC backend, which can resolve any historical height to
/// a hash; the chain-head backend only serves pinned recent blocks. Only
/// finalized blocks are served: heights above the finalized head are
/// reported as not available yet.
pub struct SubstrateClient {
    client: OnlineClient<PolkadotConfig>,
    rpc: LegacyRpcMethods<PolkadotConfig>,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let rpc_client = RpcClient::from_url(&config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let backend = LegacyBackend::builder().build(rpc_client.clone());
        let client = OnlineClient::<PolkadotConfig>::from_backend(Arc::new(backend))
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        debug!("Connected successfully");

        Ok(Self {
            client,
            rpc: LegacyRpcMethods::new(rpc_client),
        })
    }

    /// Height of the latest finalized block.
    async fn finalized_height(&self) -> ChainResult<u64> {
        let hash = self
            .rpc
            .chain_get_finalized_head()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let header = self
            .rpc
            .chain_get_header(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("no header for finalized head {hash:?}"))
            })?;

        Ok(u64::from(header.number))
    }
}

#[async_trait]
impl BlockSource for SubstrateClient {
    async fn fetch_block(&self, height: u64) -> ChainResult<Option<RawBlock>> {
        let finalized = self
            .finalized_height()
            .await
            .map_err(|e| fetch_error(height, e))?;
        if !is_finalized(height, finalized) {
            trace!(height, finalized, "Block not finalized yet");
            return Ok(None);
        }

        let Some(hash) = self
            .rpc
            .chain_get_block_hash(Some(height.into()))
            .await
            .map_err(|e| fetch_error(height, e))?
        else {
            return Ok(None);
        };

        let block = self.client.blocks().at(hash).await.map_err(|e| fetch_error(height, e))?;
        let events = block.events().await.map_err(|e| fetch_error(height, e))?;
        let extrinsics = decode_extrinsics(&block, &events).await?;
        let timestamp = extrinsics
            .iter()
            .find(|e| e.module == "Timestamp" && e.call == "set")
            .and_then(|e| timestamp_from_args(&e.args));

        Ok(Some(RawBlock {
            number: height,
            hash: BlockHash(block.hash().0),
            parent_hash: BlockHash(block.header().parent_hash.0),
            extrinsics,
            events: decode_events(&events),
            timestamp,
        }))
    }

    async fn head(&self) -> ChainResult<u64> {
        self.finalized_height().await
    }
}

fn is_finalized(height: u64, finalized: u64) -> bool {
    height <= finalized
}

fn fetch_error(height: u64, e: impl std::fmt::Display) -> ChainError {
    ChainError::BlockFetchError {
        height,
        message: e.to_string(),
    }
}

// =============================================================================
// Block decoding helpers
// =============================================================================

fn decode_events(events: &Events<PolkadotConfig>) -> Vec<RawEvent> {
    let mut raw_events = Vec::new();

    for (index, event) in events.iter().enumerate() {
        match event {
            Ok(ev) => {
                let data = ev
                    .field_values()
                    .map(|composite| positional_fields(&composite))
                    .unwrap_or(serde_json::Value::Null);

                let extrinsic_index = match ev.phase() {
                    Phase::ApplyExtrinsic(idx) => Some(idx),
                    _ => None,
                };

                raw_events.push(RawEvent {
                    index: index as u32,
                    extrinsic_index,
                    module: ev.pallet_name().to_string(),
                    name: ev.variant_name().to_string(),
                    data,
                });
            }
            Err(e) => {
                trace!(index, error = ?e, "Failed to decode event");
                record_decode_error("event", "unknown");
            }
        }
    }

    raw_events
}

async fn decode_extrinsics(
    block: &SubstrateBlock,
    events: &Events<PolkadotConfig>,
) -> ChainResult<Vec<RawExtrinsic>> {
    let extrinsics = block
        .extrinsics()
        .await
        .map_err(|e| ChainError::RpcError(e.to_string()))?;

    let mut raw_extrinsics = Vec::new();

    for (index, ext) in extrinsics.iter().enumerate() {
        let module = ext
            .pallet_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "Unknown".to_string());
        let call = ext
            .variant_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let args = match ext.field_values() {
            Ok(composite) => composite_to_json(&composite),
            Err(e) => {
                trace!(index, error = ?e, "Failed to decode extrinsic args");
                record_decode_error("extrinsic", &module);
                serde_json::Value::Null
            }
        };

        raw_extrinsics.push(RawExtrinsic {
            index: index as u32,
            success: extrinsic_succeeded(events, index as u32),
            signer: ext.address_bytes().and_then(signer_hex),
            module,
            call,
            args,
            tip: None,
            nonce: None,
        });
    }

    Ok(raw_extrinsics)
}

/// Outcome from the `System.ExtrinsicSuccess` / `ExtrinsicFailed` events.
fn extrinsic_succeeded(events: &Events<PolkadotConfig>, ext_index: u32) -> bool {
    for ev in events.iter().flatten() {
        if let Phase::ApplyExtrinsic(idx) = ev.phase()
            && idx == ext_index
            && ev.pallet_name() == "System"
        {
            match ev.variant_name() {
                "ExtrinsicSuccess" => return true,
                "ExtrinsicFailed" => return false,
                _ => {}
            }
        }
    }
    true
}

/// Hex account id from encoded `MultiAddress` or raw `AccountId32` bytes.
fn signer_hex(bytes: &[u8]) -> Option<String> {
    let account = match bytes {
        [0, rest @ ..] if rest.len() == 32 => rest,
        _ if bytes.len() == 32 => bytes,
        _ => {
            trace!(len = bytes.len(), "Unsupported signer address");
            return None;
        }
    };
    Some(format!("0x{}", hex::encode(account)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_from_multi_address() {
        let mut encoded = vec![0u8];
        encoded.extend([0xaa; 32]);
        assert_eq!(signer_hex(&encoded), Some(format!("0x{}", "aa".repeat(32))));
        assert_eq!(signer_hex(&[0xbb; 32]), Some(format!("0x{}", "bb".repeat(32))));
    }

    #[test]
    fn test_only_finalized_heights_are_served() {
        assert!(is_finalized(0, 0));
        assert!(is_finalized(99, 100));
        assert!(is_finalized(100, 100));
        assert!(!is_finalized(101, 100));
    }

    #[test]
    fn test_signer_rejects_other_address_kinds() {
        assert_eq!(signer_hex(&[0x01; 21]), None);
        assert_eq!(signer_hex(&[]), None);
    }
}
