//! Value types - the typed scalars stored in value leaves
//!
//! Every value has one of six primitive types:
//! - `Boolean`
//! - `Integer`: 64-bit signed
//! - `Double`
//! - `Date`: seconds since the Unix epoch, stored like a double
//! - `String`
//! - `Data`: raw bytes
//!
//! An optional application type string lets callers tell apart values that
//! share a primitive encoding. The store never interprets it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The primitive type of a value. The discriminant is the on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Boolean = 0,
    Integer = 1,
    Double = 2,
    Date = 3,
    String = 4,
    Data = 5,
}

impl PrimitiveType {
    /// Tag stored in the `primitive_type` column
    pub fn tag(&self) -> i64 {
        *self as i64
    }

    /// Look up a primitive type by its stored tag
    pub fn from_tag(tag: i64) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.tag() == tag)
    }

    /// Get the string representation of the primitive type
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Double => "double",
            PrimitiveType::Date => "date",
            PrimitiveType::String => "string",
            PrimitiveType::Data => "data",
        }
    }

    /// Get all primitive types
    pub fn all() -> &'static [PrimitiveType] {
        &[
            PrimitiveType::Boolean,
            PrimitiveType::Integer,
            PrimitiveType::Double,
            PrimitiveType::Date,
            PrimitiveType::String,
            PrimitiveType::Data,
        ]
    }
}

impl FromStr for PrimitiveType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => Ok(PrimitiveType::Boolean),
            "integer" | "int" => Ok(PrimitiveType::Integer),
            "double" | "float" | "real" => Ok(PrimitiveType::Double),
            "date" => Ok(PrimitiveType::Date),
            "string" | "text" => Ok(PrimitiveType::String),
            "data" | "blob" | "bytes" => Ok(PrimitiveType::Data),
            _ => Err(Error::InvalidPayload(format!("Unknown primitive type: {}", s))),
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payload of a value, one variant per primitive type.
#[derive(Debug, Clone)]
pub enum Payload {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// Seconds since the Unix epoch
    Date(f64),
    String(String),
    Data(Vec<u8>),
}

impl Payload {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Payload::Boolean(_) => PrimitiveType::Boolean,
            Payload::Integer(_) => PrimitiveType::Integer,
            Payload::Double(_) => PrimitiveType::Double,
            Payload::Date(_) => PrimitiveType::Date,
            Payload::String(_) => PrimitiveType::String,
            Payload::Data(_) => PrimitiveType::Data,
        }
    }
}

// Doubles compare by bit pattern so Eq and Hash agree.
impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Boolean(a), Payload::Boolean(b)) => a == b,
            (Payload::Integer(a), Payload::Integer(b)) => a == b,
            (Payload::Double(a), Payload::Double(b)) => a.to_bits() == b.to_bits(),
            (Payload::Date(a), Payload::Date(b)) => a.to_bits() == b.to_bits(),
            (Payload::String(a), Payload::String(b)) => a == b,
            (Payload::Data(a), Payload::Data(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Payload {}

impl Hash for Payload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Payload::Boolean(b) => b.hash(state),
            Payload::Integer(i) => i.hash(state),
            Payload::Double(d) | Payload::Date(d) => d.to_bits().hash(state),
            Payload::String(s) => s.hash(state),
            Payload::Data(bytes) => bytes.hash(state),
        }
    }
}

/// An immutable typed value with an optional application type.
///
/// Two values are equal only when primitive type, application type, and
/// payload all match.
#[derive(Debug, Clone)]
pub struct OdbValue {
    payload: Payload,
    application_type: Option<String>,
}

impl OdbValue {
    pub fn new(payload: Payload, application_type: Option<String>) -> Self {
        Self {
            payload,
            application_type,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(Payload::Boolean(value), None)
    }

    pub fn integer(value: i64) -> Self {
        Self::new(Payload::Integer(value), None)
    }

    pub fn double(value: f64) -> Self {
        Self::new(Payload::Double(value), None)
    }

    /// A date value. Times before the epoch are stored as negative seconds.
    pub fn date(time: SystemTime) -> Self {
        let seconds = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs_f64(),
            Err(before) => -before.duration().as_secs_f64(),
        };
        Self::date_from_timestamp(seconds)
    }

    /// A date value from seconds since the Unix epoch
    pub fn date_from_timestamp(seconds: f64) -> Self {
        Self::new(Payload::Date(seconds), None)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Payload::String(value.into()), None)
    }

    pub fn data(value: impl Into<Vec<u8>>) -> Self {
        Self::new(Payload::Data(value.into()), None)
    }

    /// Tag this value with an application-defined type
    pub fn with_application_type(mut self, application_type: impl Into<String>) -> Self {
        self.application_type = Some(application_type.into());
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.payload.primitive_type()
    }

    pub fn application_type(&self) -> Option<&str> {
        self.application_type.as_deref()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// The payload of a double or date value
    pub fn as_f64(&self) -> Option<f64> {
        match self.payload {
            Payload::Double(d) | Payload::Date(d) => Some(d),
            _ => None,
        }
    }

    /// The payload of a date value as a `SystemTime`.
    /// `None` for other types and for timestamps outside `SystemTime`'s range.
    pub fn as_date(&self) -> Option<SystemTime> {
        let Payload::Date(seconds) = self.payload else {
            return None;
        };
        let offset = Duration::try_from_secs_f64(seconds.abs()).ok()?;
        if seconds >= 0.0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The payload as an untyped JSON value. Dates become numbers and data
    /// becomes an array of bytes; non-finite doubles become `null`.
    pub fn to_raw(&self) -> serde_json::Value {
        use serde_json::Value;
        match &self.payload {
            Payload::Boolean(b) => Value::Bool(*b),
            Payload::Integer(i) => Value::from(*i),
            Payload::Double(d) | Payload::Date(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Data(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }
}

impl PartialEq for OdbValue {
    fn eq(&self, other: &Self) -> bool {
        self.primitive_type() == other.primitive_type()
            && self.application_type == other.application_type
            && self.payload == other.payload
    }
}

impl Eq for OdbValue {}

impl Hash for OdbValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
        self.primitive_type().hash(state);
        self.application_type.hash(state);
    }
}

impl From<bool> for OdbValue {
    fn from(value: bool) -> Self {
        Self::boolean(value)
    }
}

impl From<i64> for OdbValue {
    fn from(value: i64) -> Self {
        Self::integer(value)
    }
}

impl From<f64> for OdbValue {
    fn from(value: f64) -> Self {
        Self::double(value)
    }
}

impl From<&str> for OdbValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for OdbValue {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<Vec<u8>> for OdbValue {
    fn from(value: Vec<u8>) -> Self {
        Self::data(value)
    }
}

impl From<SystemTime> for OdbValue {
    fn from(value: SystemTime) -> Self {
        Self::date(value)
    }
}

/// Infer the primitive type from an untyped payload.
///
/// Booleans, numbers and strings map to `Boolean`, `Integer` (when the number
/// fits in an `i64`) or `Double`, and `String`. Anything else is rejected.
impl TryFrom<serde_json::Value> for OdbValue {
    type Error = Error;

    fn try_from(raw: serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        match raw {
            Value::Bool(b) => Ok(Self::boolean(b)),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Self::integer(i)),
                (None, Some(d)) => Ok(Self::double(d)),
                (None, None) => Err(Error::InvalidPayload(n.to_string())),
            },
            Value::String(s) => Ok(Self::string(s)),
            other => Err(Error::InvalidPayload(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_primitive_type_tags() {
        for t in PrimitiveType::all() {
            assert_eq!(PrimitiveType::from_tag(t.tag()), Some(*t));
        }
        assert_eq!(PrimitiveType::Boolean.tag(), 0);
        assert_eq!(PrimitiveType::Data.tag(), 5);
        assert_eq!(PrimitiveType::from_tag(6), None);
        assert_eq!("blob".parse::<PrimitiveType>().unwrap(), PrimitiveType::Data);
    }

    #[test]
    fn test_equality_requires_matching_types() {
        assert_eq!(OdbValue::integer(3), OdbValue::integer(3));
        assert_ne!(OdbValue::integer(3), OdbValue::integer(4));

        // Same bits, different primitive type
        assert_ne!(OdbValue::double(1.5), OdbValue::date_from_timestamp(1.5));

        // Same payload, different application type
        let plain = OdbValue::string("#ff0000");
        let color = OdbValue::string("#ff0000").with_application_type("color");
        assert_ne!(plain, color);
        assert_eq!(color, OdbValue::string("#ff0000").with_application_type("color"));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(OdbValue::double(f64::NAN));
        set.insert(OdbValue::double(f64::NAN));
        set.insert(OdbValue::boolean(true));
        set.insert(OdbValue::boolean(true).with_application_type("flag"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_date_round_trip() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let value = OdbValue::date(time);
        assert_eq!(value.primitive_type(), PrimitiveType::Date);
        assert_eq!(value.as_date(), Some(time));
        assert_eq!(value.as_f64(), Some(1_700_000_000.0));

        let before = UNIX_EPOCH - Duration::from_secs(86_400);
        assert_eq!(OdbValue::date(before).as_date(), Some(before));
    }

    #[test]
    fn test_accessors_are_typed() {
        let value = OdbValue::data(vec![1, 2, 3]);
        assert_eq!(value.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.as_i64(), None);
        assert_eq!(OdbValue::from("hi").as_str(), Some("hi"));
        assert_eq!(OdbValue::from(false).as_bool(), Some(false));
    }

    #[test]
    fn test_try_from_raw() {
        assert_eq!(OdbValue::try_from(json!(true)).unwrap(), OdbValue::boolean(true));
        assert_eq!(OdbValue::try_from(json!(42)).unwrap(), OdbValue::integer(42));
        assert_eq!(OdbValue::try_from(json!(2.5)).unwrap(), OdbValue::double(2.5));
        assert_eq!(OdbValue::try_from(json!("x")).unwrap(), OdbValue::string("x"));

        assert!(matches!(OdbValue::try_from(json!(null)), Err(Error::InvalidPayload(_))));
        assert!(matches!(OdbValue::try_from(json!([1, 2])), Err(Error::InvalidPayload(_))));
        assert!(matches!(OdbValue::try_from(json!({"a": 1})), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_to_raw() {
        assert_eq!(OdbValue::integer(7).to_raw(), json!(7));
        assert_eq!(OdbValue::data(vec![0, 255]).to_raw(), json!([0, 255]));
        assert_eq!(OdbValue::double(f64::INFINITY).to_raw(), json!(null));
    }

    #[test]
    fn test_non_finite_double_has_no_raw_form() {
        let raw = OdbValue::double(f64::NAN).to_raw();
        assert!(raw.is_null());
        assert!(matches!(OdbValue::try_from(raw), Err(Error::InvalidPayload(_))));
    }
}
