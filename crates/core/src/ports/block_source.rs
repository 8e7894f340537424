//! Port trait for the indexer endpoint.
//!
//! Implementations live in `cadence-substrate`: one talks to a Hydra-style
//! GraphQL indexer, the other to a Substrate node directly.

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::{Block, BlockHash};

/// Block data as delivered by the endpoint, before any mapping runs.
#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    /// Extrinsics in block order.
    pub extrinsics: Vec<RawExtrinsic>,
    /// Events in emission order.
    pub events: Vec<RawEvent>,
    /// Unix millis from the Timestamp pallet.
    pub timestamp: Option<u64>,
}

impl RawBlock {
    /// Header view handed to mapping handlers.
    pub fn header(&self) -> Block {
        Block {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: self
                .timestamp
                .and_then(|ts| i64::try_from(ts).ok())
                .and_then(chrono::DateTime::from_timestamp_millis),
            extrinsic_count: self.extrinsics.len() as u32,
            event_count: self.events.len() as u32,
        }
    }
}

/// Raw extrinsic data.
#[derive(Debug, Clone, Default)]
pub struct RawExtrinsic {
    /// Index in block.
    pub index: u32,
    /// Module (pallet) name.
    pub module: String,
    /// Call name.
    pub call: String,
    /// Signer address as reported by the endpoint.
    pub signer: Option<String>,
    /// Arguments as JSON.
    pub args: serde_json::Value,
    pub success: bool,
    pub tip: Option<u128>,
    pub nonce: Option<u32>,
}

/// Raw event data.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    /// Index in block.
    pub index: u32,
    /// Extrinsic index (if applicable).
    pub extrinsic_index: Option<u32>,
    /// Module (pallet) name.
    pub module: String,
    /// Event variant name.
    pub name: String,
    /// Event data as JSON, positional.
    pub data: serde_json::Value,
}

impl RawEvent {
    /// Positional event parameter.
    pub fn param(&self, position: usize) -> Option<&serde_json::Value> {
        match &self.data {
            serde_json::Value::Array(items) => items.get(position),
            serde_json::Value::Object(map) => map.values().nth(position),
            other if position == 0 => Some(other),
            _ => None,
        }
    }
}

/// Port trait for the block stream.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetch one complete block.
    ///
    /// `Ok(None)` means the endpoint has not reached `height` yet.
    async fn fetch_block(&self, height: u64) -> ChainResult<Option<RawBlock>>;

    /// Highest height the endpoint can currently serve.
    async fn head(&self) -> ChainResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_params_by_position() {
        let event = RawEvent {
            data: json!(["0xaa", "0xbb", "100"]),
            ..Default::default()
        };
        assert_eq!(event.param(2), Some(&json!("100")));
        assert_eq!(event.param(3), None);

        let named = RawEvent {
            data: json!({"from": "0xaa", "amount": "5"}),
            ..Default::default()
        };
        assert!(named.param(1).is_some());
    }

    #[test]
    fn test_header_from_raw() {
        let raw = RawBlock {
            number: 7,
            timestamp: Some(1_704_067_200_000),
            events: vec![RawEvent::default(), RawEvent::default()],
            ..Default::default()
        };
        let header = raw.header();
        assert_eq!(header.number, 7);
        assert_eq!(header.event_count, 2);
        assert!(header.timestamp.is_some());
    }
}
