//! Domain models for the processing pipeline.
//!
//! These models are storage-agnostic. Entity records themselves live in
//! [`crate::entity`]; this module covers chain data and processor state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// 32-byte Hash Types
// =============================================================================

/// Macro to generate 32-byte hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash32_newtype!(
    /// 32-byte block hash (Blake2-256).
    BlockHash
);

hash32_newtype!(
    /// 32-byte account identifier (SS58 decoded public key).
    AccountId
);

// =============================================================================
// Block Data
// =============================================================================

/// Block header as seen by mapping handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block number (height).
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    /// Timestamp from `pallet_timestamp` (if the source reports one).
    pub timestamp: Option<DateTime<Utc>>,
    pub extrinsic_count: u32,
    pub event_count: u32,
}

// =============================================================================
// Processor State
// =============================================================================

/// Durable progress marker of one indexing stream.
///
/// `last_processed_block` is `-1` before the first block commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCursor {
    /// Stream identifier (processor name).
    pub stream_id: String,
    pub last_processed_block: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProcessorCursor {
    /// Cursor of a stream that has not processed anything yet.
    pub fn genesis(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            last_processed_block: -1,
            updated_at: Utc::now(),
        }
    }

    /// Height the stream resumes from.
    pub fn next_height(&self) -> u64 {
        u64::try_from(self.last_processed_block + 1).unwrap_or(0)
    }
}

// =============================================================================
// Tests
// =============================================================================
