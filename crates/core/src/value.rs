//! Tagged field values and literal coercion.
//!
//! Handlers and query callers speak JSON (`serde_json::Value`); everything
//! past validation speaks [`FieldValue`]. Coercion is strict: a literal that
//! does not fit the field's semantic type is a `TypeMismatch`, never a
//! silent conversion.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::BigInt;
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::schema::{FieldDescriptor, SemanticType};

/// Most decimal digits a `BigInteger` may carry; enough for any 256-bit
/// integer and matching the `NUMERIC(78, 0)` column it is stored in.
pub const BIG_INTEGER_MAX_DIGITS: usize = 78;

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Identifier(String),
    String(String),
    Integer(i64),
    BigInteger(BigInt),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
    Enum(String),
    Reference(String),
}

impl FieldValue {
    /// Coerce a non-null JSON literal to the field's type.
    pub fn coerce(field: &FieldDescriptor, raw: &Value) -> DomainResult<Self> {
        let mismatch = || DomainError::TypeMismatch {
            field: field.name.clone(),
            expected: field.semantic_type,
            value: raw.to_string(),
        };

        let value = match (field.semantic_type, raw) {
            (_, Value::Null) => return Err(mismatch()),
            (SemanticType::Identifier, Value::String(s)) if !s.is_empty() => {
                FieldValue::Identifier(s.clone())
            }
            (SemanticType::Reference, Value::String(s)) if !s.is_empty() => {
                FieldValue::Reference(s.clone())
            }
            (SemanticType::String, Value::String(s)) => FieldValue::String(s.clone()),
            (SemanticType::Integer, Value::Number(n)) => {
                FieldValue::Integer(n.as_i64().ok_or_else(mismatch)?)
            }
            (SemanticType::Integer, Value::String(s)) => {
                FieldValue::Integer(s.trim().parse().map_err(|_| mismatch())?)
            }
            (SemanticType::BigInteger, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::BigInteger(BigInt::from(i))
                } else if let Some(u) = n.as_u64() {
                    FieldValue::BigInteger(BigInt::from(u))
                } else {
                    // floats never reach a big-integer column
                    return Err(mismatch());
                }
            }
            (SemanticType::BigInteger, Value::String(s)) => {
                FieldValue::BigInteger(parse_big_integer(s).ok_or_else(mismatch)?)
            }
            (SemanticType::Bytes, Value::String(s)) => {
                let hex_str = s.strip_prefix("0x").unwrap_or(s);
                FieldValue::Bytes(hex::decode(hex_str).map_err(|_| mismatch())?)
            }
            (SemanticType::Bytes, Value::Array(items)) => {
                let bytes = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(mismatch)?;
                FieldValue::Bytes(bytes)
            }
            (SemanticType::Timestamp, Value::String(s)) => FieldValue::Timestamp(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| mismatch())?
                    .with_timezone(&Utc),
            ),
            (SemanticType::Timestamp, Value::Number(n)) => {
                let millis = n.as_i64().ok_or_else(mismatch)?;
                FieldValue::Timestamp(DateTime::from_timestamp_millis(millis).ok_or_else(mismatch)?)
            }
            (SemanticType::Boolean, Value::Bool(b)) => FieldValue::Boolean(*b),
            (SemanticType::Enum, Value::String(s)) if field.variants.contains(s) => {
                FieldValue::Enum(s.clone())
            }
            _ => return Err(mismatch()),
        };

        Ok(value)
    }

    /// Coerce a literal, accepting `null` for nullable fields.
    pub fn coerce_nullable(field: &FieldDescriptor, raw: &Value) -> DomainResult<Self> {
        if raw.is_null() {
            if field.nullable {
                return Ok(FieldValue::Null);
            }
            return Err(DomainError::TypeMismatch {
                field: field.name.clone(),
                expected: field.semantic_type,
                value: "null".to_string(),
            });
        }
        Self::coerce(field, raw)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// String payload of textual variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Identifier(s)
            | FieldValue::String(s)
            | FieldValue::Enum(s)
            | FieldValue::Reference(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// JSON rendering used for handler payloads and typed decoding.
    ///
    /// Big integers become decimal strings and bytes become `0x` hex so
    /// neither loses precision.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Identifier(s)
            | FieldValue::String(s)
            | FieldValue::Enum(s)
            | FieldValue::Reference(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::BigInteger(n) => Value::String(n.to_string()),
            FieldValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Compare two non-null values of the same variant.
    ///
    /// Strings compare byte-wise; storage adapters must order text the same
    /// way (Postgres uses `COLLATE "C"`). Returns `None` across variants.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Identifier(a), Identifier(b))
            | (String(a), String(b))
            | (Enum(a), Enum(b))
            | (Reference(a), Reference(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (BigInteger(a), BigInteger(b)) => Some(a.cmp(b)),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_json() {
            Value::String(s) => f.write_str(&s),
            other => write!(f, "{other}"),
        }
    }
}

/// Parse a decimal big integer; rejects fractions, exponents and hex.
fn parse_big_integer(s: &str) -> Option<BigInt> {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0').len();
    if significant > BIG_INTEGER_MAX_DIGITS {
        return None;
    }
    BigInt::from_str(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(ty: SemanticType) -> FieldDescriptor {
        FieldDescriptor::new("f", ty)
    }

    #[test]
    fn test_big_integer_beyond_u64_is_exact() {
        let v = FieldValue::coerce(
            &field(SemanticType::BigInteger),
            &json!("340282366920938463463374607431768211456"),
        )
        .unwrap();
        let smaller = FieldValue::coerce(
            &field(SemanticType::BigInteger),
            &json!("340282366920938463463374607431768211455"),
        )
        .unwrap();
        assert_eq!(v.compare(&smaller), Some(Ordering::Greater));
        assert_eq!(v.to_json(), json!("340282366920938463463374607431768211456"));
    }

    #[test]
    fn test_big_integer_rejects_floats_and_garbage() {
        let f = field(SemanticType::BigInteger);
        assert!(FieldValue::coerce(&f, &json!(1.5)).is_err());
        assert!(FieldValue::coerce(&f, &json!("1e18")).is_err());
        assert!(FieldValue::coerce(&f, &json!("0x10")).is_err());
        assert!(FieldValue::coerce(&f, &json!("-12")).is_ok());
    }

    #[test]
    fn test_big_integer_digit_bound() {
        let f = field(SemanticType::BigInteger);
        let widest = "9".repeat(BIG_INTEGER_MAX_DIGITS);
        assert!(FieldValue::coerce(&f, &json!(widest)).is_ok());
        assert!(FieldValue::coerce(&f, &json!(format!("-{widest}"))).is_ok());
        assert!(FieldValue::coerce(&f, &json!(format!("000{widest}"))).is_ok());
        assert!(matches!(
            FieldValue::coerce(&f, &json!(format!("1{widest}"))),
            Err(DomainError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_bytes_accept_hex_and_arrays() {
        let f = field(SemanticType::Bytes);
        assert_eq!(
            FieldValue::coerce(&f, &json!("0xaabb")).unwrap(),
            FieldValue::Bytes(vec![0xaa, 0xbb])
        );
        assert_eq!(
            FieldValue::coerce(&f, &json!([170, 187])).unwrap(),
            FieldValue::Bytes(vec![0xaa, 0xbb])
        );
        assert!(FieldValue::coerce(&f, &json!([256])).is_err());
        assert!(FieldValue::coerce(&f, &json!("0xzz")).is_err());
    }

    #[test]
    fn test_enum_restricted_to_variants() {
        let f = FieldDescriptor::new("status", SemanticType::Enum).with_variants(["Open", "Closed"]);
        assert!(FieldValue::coerce(&f, &json!("Open")).is_ok());
        assert!(FieldValue::coerce(&f, &json!("open")).is_err());
    }

    #[test]
    fn test_timestamp_from_rfc3339_and_millis() {
        let f = field(SemanticType::Timestamp);
        let a = FieldValue::coerce(&f, &json!("2024-01-01T00:00:00Z")).unwrap();
        let b = FieldValue::coerce(&f, &json!(1_704_067_200_000i64)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_only_for_nullable() {
        let required = field(SemanticType::String);
        let optional = field(SemanticType::String).nullable();
        assert!(FieldValue::coerce_nullable(&required, &Value::Null).is_err());
        assert_eq!(
            FieldValue::coerce_nullable(&optional, &Value::Null).unwrap(),
            FieldValue::Null
        );
        assert!(FieldValue::coerce(&optional, &Value::Null).is_err());
    }

    #[test]
    fn test_compare_across_variants_is_none() {
        assert_eq!(
            FieldValue::Integer(1).compare(&FieldValue::String("1".into())),
            None
        );
    }
}
