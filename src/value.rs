//! Typed values and result rows

use crate::error::{Error, Result};
use crate::protocol::constants::oid;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// Digits in 2^53 - 1; BIGINT text this long or longer decodes as [`Value::BigInt`]
const SAFE_INTEGER_DIGITS: usize = "9007199254740991".len();

/// A column value or query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer that fits comfortably in 53 bits when it came from a BIGINT column
    Int(i64),
    /// BIGINT too wide to be exact in an `f64`
    BigInt(i128),
    /// Floating point (parameters only)
    Float(f64),
    /// Text
    Text(String),
    /// Raw bytes, bound in binary format
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::BigInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            // JSON consumers lose precision past 2^53
            Value::BigInt(n) => serializer.collect_str(n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i128> for Value {
    fn from(n: i128) -> Self {
        Value::BigInt(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column types the result decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Bool,
    Name,
    BigInt,
    SmallInt,
    Integer,
    Text,
    Varchar,
}

impl ResultType {
    /// Map a type OID; `None` for anything outside the supported set
    pub fn from_oid(type_oid: u32) -> Option<Self> {
        match type_oid {
            oid::BOOL => Some(ResultType::Bool),
            oid::NAME => Some(ResultType::Name),
            oid::BIGINT => Some(ResultType::BigInt),
            oid::SMALLINT => Some(ResultType::SmallInt),
            oid::INTEGER => Some(ResultType::Integer),
            oid::TEXT => Some(ResultType::Text),
            oid::VARCHAR => Some(ResultType::Varchar),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultType::Bool => "BOOL",
            ResultType::Name => "NAME",
            ResultType::BigInt => "BIGINT",
            ResultType::SmallInt => "SMALLINT",
            ResultType::Integer => "INTEGER",
            ResultType::Text => "TEXT",
            ResultType::Varchar => "VARCHAR",
        }
    }

    /// Coerce a text-format column value
    pub fn decode(self, raw: &str) -> Result<Value> {
        match self {
            ResultType::Text | ResultType::Name | ResultType::Varchar => {
                Ok(Value::Text(raw.to_string()))
            }
            ResultType::SmallInt | ResultType::Integer => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.type_error(raw)),
            ResultType::BigInt => {
                if raw.len() >= SAFE_INTEGER_DIGITS {
                    raw.parse::<i128>()
                        .map(Value::BigInt)
                        .map_err(|_| self.type_error(raw))
                } else {
                    raw.parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| self.type_error(raw))
                }
            }
            ResultType::Bool => match raw {
                "t" => Ok(Value::Bool(true)),
                "f" => Ok(Value::Bool(false)),
                _ => Err(self.type_error(raw)),
            },
        }
    }

    fn type_error(self, raw: &str) -> Error {
        Error::Type(format!("{:?} is not a valid {} value", raw, self.name()))
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One result row: column name → value, in column order
///
/// Column names are unique within a row. A join that returns two columns with
/// the same name keeps the first non-null value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a column value; a null never replaces a non-null value of the same name
    pub fn set(&mut self, name: &str, value: Value) {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => {
                if !value.is_null() {
                    *existing = value;
                }
            }
            None => self.columns.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            let name: String = k.into();
            row.set(&name, v.into());
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_table() {
        assert_eq!(ResultType::from_oid(16), Some(ResultType::Bool));
        assert_eq!(ResultType::from_oid(19), Some(ResultType::Name));
        assert_eq!(ResultType::from_oid(20), Some(ResultType::BigInt));
        assert_eq!(ResultType::from_oid(21), Some(ResultType::SmallInt));
        assert_eq!(ResultType::from_oid(23), Some(ResultType::Integer));
        assert_eq!(ResultType::from_oid(25), Some(ResultType::Text));
        assert_eq!(ResultType::from_oid(1043), Some(ResultType::Varchar));
        assert_eq!(ResultType::from_oid(1700), None);
    }

    #[test]
    fn test_bigint_boundary() {
        // 15 digits: below the threshold
        assert_eq!(
            ResultType::BigInt.decode("900719925474099").unwrap(),
            Value::Int(900719925474099)
        );
        // 16 digits: at the threshold, even though it fits in 2^53
        assert_eq!(
            ResultType::BigInt.decode("9007199254740991").unwrap(),
            Value::BigInt(9007199254740991)
        );
        assert_eq!(
            ResultType::BigInt.decode("9223372036854775807").unwrap(),
            Value::BigInt(i64::MAX as i128)
        );
        // sign counts toward the length
        assert_eq!(
            ResultType::BigInt.decode("-900719925474099").unwrap(),
            Value::BigInt(-900719925474099)
        );
    }

    #[test]
    fn test_bool_decoding() {
        assert_eq!(ResultType::Bool.decode("t").unwrap(), Value::Bool(true));
        assert_eq!(ResultType::Bool.decode("f").unwrap(), Value::Bool(false));
        assert!(matches!(ResultType::Bool.decode("true"), Err(Error::Type(_))));
    }

    #[test]
    fn test_integer_decoding() {
        assert_eq!(ResultType::SmallInt.decode("-12").unwrap(), Value::Int(-12));
        assert_eq!(ResultType::Integer.decode("10").unwrap(), Value::Int(10));
        assert!(ResultType::Integer.decode("ten").is_err());
        assert_eq!(
            ResultType::Varchar.decode("10").unwrap(),
            Value::Text("10".into())
        );
    }

    #[test]
    fn test_row_null_does_not_overwrite() {
        let mut row = Row::new();
        row.set("id", Value::Int(0));
        row.set("id", Value::Null);
        assert_eq!(row.get("id"), Some(&Value::Int(0)));

        row.set("name", Value::Null);
        assert_eq!(row.get("name"), Some(&Value::Null));
        row.set("name", Value::Text("a".into()));
        assert_eq!(row.get("name"), Some(&Value::Text("a".into())));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row: Row = vec![
            ("z", Value::Int(1)),
            ("a", Value::BigInt(12345678901234567)),
            ("n", Value::Null),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"z":1,"a":"12345678901234567","n":null}"#);
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
