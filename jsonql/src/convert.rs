//! Conversion between host storage records and JSONQL values
//!
//! Converters are strict about the representation they accept: handing a
//! converter a record it does not understand is an error, never a silent
//! empty value.

use crate::runtime::values::Value;
use indexmap::IndexMap;
use std::convert::TryFrom;

/// Error type for record conversion
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{converter} cannot convert a {found} record")]
    UnexpectedRepresentation {
        converter: &'static str,
        found: &'static str,
    },

    #[error("Malformed record: {reason}")]
    Malformed { reason: String },

    #[error("Value has no record representation: {what}")]
    Unrepresentable { what: String },
}

/// Opaque record as handed over by a storage layer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRecord {
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl HostRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            HostRecord::Text(_) => "text",
            HostRecord::Bytes(_) => "bytes",
            HostRecord::Json(_) => "json",
        }
    }
}

/// Turns a source record into a (reusable) target.
pub trait RecordConverter {
    type Source;
    type Target;

    /// A fresh target suitable for passing to [`RecordConverter::convert`].
    fn create_target(&self) -> Self::Target;

    fn convert(
        &mut self,
        source: &Self::Source,
        target: &mut Self::Target,
    ) -> Result<(), ConversionError>;

    fn convert_new(&mut self, source: &Self::Source) -> Result<Self::Target, ConversionError> {
        let mut target = self.create_target();
        self.convert(source, &mut target)?;
        Ok(target)
    }
}

/// Parses JSON text records into values.
#[derive(Debug, Default)]
pub struct JsonTextConverter;

impl RecordConverter for JsonTextConverter {
    type Source = HostRecord;
    type Target = Value;

    fn create_target(&self) -> Value {
        Value::Null
    }

    fn convert(&mut self, source: &HostRecord, target: &mut Value) -> Result<(), ConversionError> {
        let text = match source {
            HostRecord::Text(text) => text,
            other => {
                return Err(ConversionError::UnexpectedRepresentation {
                    converter: "JsonTextConverter",
                    found: other.kind(),
                })
            }
        };
        let parsed: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConversionError::Malformed {
                reason: e.to_string(),
            })?;
        *target = Value::from(parsed);
        Ok(())
    }
}

/// Renders values as JSON text records.
#[derive(Debug, Default)]
pub struct ToJsonTextConverter;

impl RecordConverter for ToJsonTextConverter {
    type Source = Value;
    type Target = HostRecord;

    fn create_target(&self) -> HostRecord {
        HostRecord::Text(String::new())
    }

    fn convert(&mut self, source: &Value, target: &mut HostRecord) -> Result<(), ConversionError> {
        let json = serde_json::Value::try_from(source)?;
        let text = serde_json::to_string(&json).map_err(|e| ConversionError::Malformed {
            reason: e.to_string(),
        })?;
        *target = HostRecord::Text(text);
        Ok(())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }
}

impl TryFrom<&Value> for serde_json::Value {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ConversionError::Unrepresentable {
                    what: format!("non-finite number {}", d),
                })?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(serde_json::Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Spilled(spilled) => {
                let items = spilled
                    .to_vec()
                    .map_err(|e| ConversionError::Unrepresentable {
                        what: e.to_string(),
                    })?;
                serde_json::Value::Array(
                    items
                        .iter()
                        .map(serde_json::Value::try_from)
                        .collect::<Result<_, _>>()?,
                )
            }
            Value::Record(fields) => {
                let mut object = serde_json::Map::new();
                for (k, v) in fields {
                    object.insert(k.clone(), serde_json::Value::try_from(v)?);
                }
                serde_json::Value::Object(object)
            }
            Value::Function(_) => {
                return Err(ConversionError::Unrepresentable {
                    what: "function".to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_text_records() {
        let mut conv = JsonTextConverter;
        let value = conv
            .convert_new(&HostRecord::Text(r#"{"a": [1, 2.5, null], "b": "x"}"#.into()))
            .unwrap();
        let mut expected = IndexMap::new();
        expected.insert(
            "a".to_string(),
            Value::Array(vec![Value::Long(1), Value::Double(2.5), Value::Null]),
        );
        expected.insert("b".to_string(), Value::string("x"));
        assert_eq!(value, Value::Record(expected));
    }

    #[test]
    fn rejects_unexpected_representation() {
        let mut conv = JsonTextConverter;
        let mut target = conv.create_target();
        let err = conv
            .convert(&HostRecord::Bytes(b"{}".to_vec()), &mut target)
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::UnexpectedRepresentation { found: "bytes", .. }
        ));
        assert_eq!(target, Value::Null);
    }

    #[test]
    fn malformed_text_is_reported() {
        let mut conv = JsonTextConverter;
        let err = conv.convert_new(&HostRecord::Text("{oops".into())).unwrap_err();
        assert!(matches!(err, ConversionError::Malformed { .. }));
    }

    #[test]
    fn writes_text_records() {
        let mut conv = ToJsonTextConverter;
        let record = conv
            .convert_new(&Value::Array(vec![Value::Long(1), Value::string("a")]))
            .unwrap();
        assert_eq!(record, HostRecord::Text(r#"[1,"a"]"#.to_string()));

        let err = conv.convert_new(&Value::Double(f64::INFINITY)).unwrap_err();
        assert!(matches!(err, ConversionError::Unrepresentable { .. }));
    }
}
