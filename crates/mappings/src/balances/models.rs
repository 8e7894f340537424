//! Entities of the balances pack.

use serde::{Deserialize, Serialize};

use cadence_core::error::DomainResult;
use cadence_core::schema::{EntitySchema, FieldDescriptor, SemanticType};

pub const TRANSFER: &str = "Transfer";
pub const ACCOUNT: &str = "Account";

/// `Transfer`: one `Balances.Transfer` event, id `{block}-{eventIndex}`.
pub fn transfer_schema() -> DomainResult<EntitySchema> {
    EntitySchema::new(
        TRANSFER,
        vec![
            FieldDescriptor::new("from", SemanticType::Bytes),
            FieldDescriptor::new("to", SemanticType::Bytes),
            FieldDescriptor::new("value", SemanticType::BigInteger),
            FieldDescriptor::new("block", SemanticType::Integer),
            FieldDescriptor::new("timestamp", SemanticType::Timestamp).nullable(),
            FieldDescriptor::new("sender", SemanticType::Reference).references(ACCOUNT),
            FieldDescriptor::new("recipient", SemanticType::Reference).references(ACCOUNT),
        ],
    )
}

/// `Account`: every address seen in a transfer, id is the hex account.
pub fn account_schema() -> DomainResult<EntitySchema> {
    EntitySchema::new(
        ACCOUNT,
        vec![
            FieldDescriptor::new("firstSeenBlock", SemanticType::Integer),
            FieldDescriptor::new("lastSeenBlock", SemanticType::Integer),
        ],
    )
}

/// Payload written for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// 0x-prefixed hex.
    pub from: String,
    pub to: String,
    /// Decimal string; balances exceed `u64`.
    pub value: String,
    pub block: u64,
    /// RFC 3339.
    pub timestamp: Option<String>,
    pub sender: String,
    pub recipient: String,
}

/// First and last block an account took part in a transfer.
///
/// Min/max folds over the blocks seen; replaying a block is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub first_seen_block: i64,
    pub last_seen_block: i64,
}
