//! Shared parsing helpers for mapping handlers.
//!
//! Endpoints disagree on how they render the same SCALE value: a Hydra
//! indexer sends accounts as hex strings, a node decoded through metadata
//! yields nested byte arrays. These helpers accept every shape seen so far.

use std::str::FromStr;

use num_bigint::BigUint;
use serde_json::Value;

use cadence_core::error::{DomainError, DomainResult};
use cadence_core::models::AccountId;
use cadence_core::ports::RawEvent;

// =============================================================================
// Event parameter extraction
// =============================================================================

/// Positional event parameter, parsed, or a handler error naming it.
///
/// ```ignore
/// let from = event_param(event, 0, "from", parse_account)?;
/// ```
pub fn event_param<T>(
    event: &RawEvent,
    position: usize,
    name: &str,
    parser: fn(&Value) -> Option<T>,
) -> DomainResult<T> {
    event.param(position).and_then(parser).ok_or_else(|| {
        DomainError::Handler(format!(
            "{}.{}: cannot parse parameter {position} ({name}) from {}",
            event.module, event.name, event.data
        ))
    })
}

// =============================================================================
// Account parsing
// =============================================================================

/// Parse an account id from its JSON renderings.
///
/// - Hex string, with or without `0x`
/// - Wrapped object: `{ "Id": "0x..." }`
/// - Single-element wrapper: `["0x..."]` or `[[b0, ..., b31]]`
/// - Byte array: `[b0, ..., b31]`
pub fn parse_account(value: &Value) -> Option<AccountId> {
    match value {
        Value::String(s) => AccountId::from_hex(s).ok(),
        Value::Object(obj) => obj
            .get("Id")
            .or_else(|| obj.get("id"))
            .and_then(parse_account),
        Value::Array(items) if items.len() == 1 => parse_account(&items[0]),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?;
            let arr: [u8; 32] = bytes.try_into().ok()?;
            Some(AccountId(arr))
        }
        _ => None,
    }
}

// =============================================================================
// Numeric parsing
// =============================================================================

/// Parse a balance from a JSON number or decimal string.
///
/// Balances are `u128` on chain and routinely exceed what a JSON number can
/// carry, so endpoints send them as strings.
pub fn parse_amount(value: &Value) -> Option<BigUint> {
    match value {
        Value::Number(n) => n.as_u64().map(BigUint::from),
        Value::String(s) => BigUint::from_str(s.trim()).ok(),
        _ => None,
    }
}
