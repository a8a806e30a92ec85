// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation
//!
//! Objects and sequences map onto JSON objects and arrays. Sets become arrays in insertion
//! order. Maps become objects, provided every key is a string. Functions, non-finite floats and
//! maps with other keys have no JSON form.
use crate::{Value, ValueError, value::Data};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(fields) => {
                Value::object(fields.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl TryFrom<&Value> for serde_json::Value {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(ValueError::NotRepresentable {
                    what: "non-finite float",
                })?,
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Function(_) => {
                return Err(ValueError::NotRepresentable { what: "function" });
            }
            Value::Compound(c) => match &*c.data() {
                Data::Object(fields) => serde_json::Value::Object(
                    fields
                        .iter()
                        .map(|(k, v)| Ok::<_, ValueError>((k.to_string(), Self::try_from(v)?)))
                        .collect::<Result<_, ValueError>>()?,
                ),
                Data::Sequence(items) => serde_json::Value::Array(
                    items
                        .iter()
                        .map(Self::try_from)
                        .collect::<Result<_, _>>()?,
                ),
                Data::Set(elements) => serde_json::Value::Array(
                    elements
                        .iter()
                        .map(Self::try_from)
                        .collect::<Result<_, _>>()?,
                ),
                Data::Map(entries) => serde_json::Value::Object(
                    entries
                        .iter()
                        .map(|(k, v)| {
                            let key = k.as_str().ok_or(ValueError::NotRepresentable {
                                what: "map with non-string keys",
                            })?;
                            Ok::<_, ValueError>((key.to_owned(), Self::try_from(v)?))
                        })
                        .collect::<Result<_, ValueError>>()?,
                ),
            },
        })
    }
}

impl TryFrom<Value> for serde_json::Value {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;
    use serde_json::json;

    #[test]
    fn from_json_keeps_integers_apart_from_floats() {
        let v = Value::from(json!({ "i": 1, "f": 1.5, "list": [true, null, "s"] }));
        assert_eq!(v.get("i"), Some(Value::Int(1)));
        assert_eq!(v.get("f"), Some(Value::Float(1.5)));
        assert!(v.get("list").unwrap().deep_eq(&value!([true, null, "s"])));
    }

    #[test]
    fn to_json() {
        let v = value!({ "a" => [1, 2.5, "x"], "b" => { "c" => null } });
        let json = serde_json::Value::try_from(&v).unwrap();
        assert_eq!(json, json!({ "a": [1, 2.5, "x"], "b": { "c": null } }));
    }

    #[test]
    fn sets_and_string_keyed_maps_convert() {
        let v = Value::object([
            ("s", Value::set([Value::from(1), Value::from(2)])),
            ("m", Value::map([(Value::from("k"), Value::from(true))])),
        ]);
        let json = serde_json::Value::try_from(&v).unwrap();
        assert_eq!(json, json!({ "s": [1, 2], "m": { "k": true } }));
    }

    #[test]
    fn unrepresentable_values_fail() {
        let f = Value::function(|_| Value::Null);
        assert_eq!(
            serde_json::Value::try_from(&f),
            Err(ValueError::NotRepresentable { what: "function" })
        );
        let m = Value::map([(Value::from(1), Value::from(1))]);
        assert!(serde_json::Value::try_from(m).is_err());
        assert!(serde_json::Value::try_from(Value::Float(f64::NAN)).is_err());
    }
}
