//! SCALE value to JSON conversion.
//!
//! Byte arrays of common key and hash lengths become `0x` hex strings,
//! integers that fit in a `u64`/`i64` become JSON numbers and wider ones
//! decimal strings. `Option` variants collapse to their value or `null`.

use num_bigint::{BigInt, BigUint};
use serde_json::{Map, Value as Json};
use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};

/// Positional parameters of an event, regardless of field names.
pub fn positional_fields<T>(composite: &Composite<T>) -> Json {
    let values: Vec<Json> = match composite {
        Composite::Unnamed(values) => values.iter().map(value_to_json).collect(),
        Composite::Named(fields) => fields.iter().map(|(_, v)| value_to_json(v)).collect(),
    };
    Json::Array(values)
}

/// Convert a Composite to a JSON value.
pub fn composite_to_json<T>(composite: &Composite<T>) -> Json {
    match composite {
        Composite::Unnamed(values) => {
            if let Some(hex_str) = as_byte_array(values) {
                return Json::String(hex_str);
            }
            // newtype wrappers such as AccountId32
            if values.len() == 1 {
                return value_to_json(&values[0]);
            }
            Json::Array(values.iter().map(value_to_json).collect())
        }
        Composite::Named(fields) => {
            let obj: Map<String, Json> = fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect();
            Json::Object(obj)
        }
    }
}

fn as_byte_array<T>(values: &[Value<T>]) -> Option<String> {
    if !matches!(values.len(), 20 | 32 | 64) {
        return None;
    }

    let bytes = values
        .iter()
        .map(|value| match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect::<Option<Vec<u8>>>()?;

    Some(format!("0x{}", hex::encode(bytes)))
}

pub fn value_to_json<T>(value: &Value<T>) -> Json {
    match &value.value {
        ValueDef::Composite(composite) => composite_to_json(composite),
        ValueDef::Variant(variant) => {
            let inner = composite_to_json(&variant.values);
            match variant.name.as_str() {
                "None" => Json::Null,
                // `Some(x)` and `MultiAddress::Id(x)` carry a single value
                "Some" | "Id" => inner,
                name if is_unit(&variant.values) => Json::String(name.to_string()),
                name => {
                    let mut map = Map::new();
                    map.insert(name.to_string(), inner);
                    Json::Object(map)
                }
            }
        }
        ValueDef::Primitive(primitive) => primitive_to_json(primitive),
        ValueDef::BitSequence(bits) => Json::String(format!("{bits:?}")),
    }
}

fn is_unit<T>(composite: &Composite<T>) -> bool {
    match composite {
        Composite::Unnamed(values) => values.is_empty(),
        Composite::Named(fields) => fields.is_empty(),
    }
}

fn primitive_to_json(primitive: &Primitive) -> Json {
    match primitive {
        Primitive::Bool(b) => Json::Bool(*b),
        Primitive::Char(c) => Json::String(c.to_string()),
        Primitive::String(s) => Json::String(s.clone()),
        Primitive::U128(n) => match u64::try_from(*n) {
            Ok(small) => Json::from(small),
            Err(_) => Json::String(n.to_string()),
        },
        Primitive::I128(n) => match i64::try_from(*n) {
            Ok(small) => Json::from(small),
            Err(_) => Json::String(n.to_string()),
        },
        Primitive::U256(bytes) => Json::String(BigUint::from_bytes_le(bytes).to_string()),
        Primitive::I256(bytes) => Json::String(BigInt::from_signed_bytes_le(bytes).to_string()),
    }
}

/// Millisecond timestamp from `Timestamp.set` arguments.
///
/// Values outside 2020..2050 are rejected as misdecoded.
pub fn timestamp_from_args(args: &Json) -> Option<u64> {
    const MIN_TIMESTAMP_MS: u64 = 1_577_836_800_000;
    const MAX_TIMESTAMP_MS: u64 = 2_524_608_000_000;

    let candidate = match args {
        Json::Object(map) => map.get("now").or_else(|| map.values().next()),
        Json::Array(items) => items.first(),
        other => Some(other),
    }?;

    let millis = match candidate {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }?;

    (MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS)
        .contains(&millis)
        .then_some(millis)
}
