//! Deep copies between engine values and host data
//!
//! A [`HostValue`] is independent of any context: it can be stored,
//! compared, printed, or converted to JSON after the context is gone.

use std::fmt;

use thiserror::Error;

use crate::context::Context;
use crate::error::Result;
use crate::object::{Array, Object};
use crate::string::JsString;
use crate::value::{JsType, Value};

/// Maximum nesting depth of a deep copy (cycles hit this limit)
pub const MAX_DEPTH: usize = 64;

/// Errors that can occur during marshalling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// Value cannot be recreated in a context (functions, externals)
    #[error("Value cannot be marshalled: {0}")]
    Unmarshallable(&'static str),

    /// Nesting deeper than [`MAX_DEPTH`], usually a cycle
    #[error("Maximum marshalling depth exceeded ({0})")]
    MaxDepthExceeded(usize),
}

/// Context-independent copy of a value
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// `null` or `undefined`
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit floating point number
    Double(f64),

    /// String value
    String(String),

    /// Array elements in order
    Array(Vec<HostValue>),

    /// Own enumerable properties in engine enumeration order
    Object(Vec<(String, HostValue)>),

    /// A function; only its presence is recorded
    Function,

    /// A host pointer, as an address
    External(usize),
}

impl HostValue {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Double(_) => "double",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Function => "function",
            HostValue::External(_) => "external",
        }
    }

    /// Property `key` of an object copy
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Recreate the value in `ctx`
    ///
    /// Functions and externals are not recreated and fail with
    /// [`MarshalError::Unmarshallable`].
    pub fn into_value<'c>(&self, ctx: &'c Context) -> Result<'c, Value<'c>> {
        Ok(match self {
            HostValue::Null => Value::null(ctx),
            HostValue::Bool(b) => Value::bool(ctx, *b),
            HostValue::Int(i) => Value::int(ctx, *i),
            HostValue::Double(d) => Value::double(ctx, *d),
            HostValue::String(s) => JsString::new(ctx, s)?.into_value(),
            HostValue::Array(items) => {
                let array = Array::new(ctx)?;
                for (i, item) in items.iter().enumerate() {
                    array.set(i as u32, &item.into_value(ctx)?)?;
                }
                array.into_value()
            }
            HostValue::Object(entries) => {
                let object = Object::new(ctx)?;
                for (key, item) in entries {
                    object.set(key, &item.into_value(ctx)?)?;
                }
                object.into_value()
            }
            HostValue::Function => return Err(MarshalError::Unmarshallable("function").into()),
            HostValue::External(_) => return Err(MarshalError::Unmarshallable("external").into()),
        })
    }

    /// JSON rendering; functions, externals and non-finite numbers become `null`
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            HostValue::Null | HostValue::Function | HostValue::External(_) => Json::Null,
            HostValue::Bool(b) => Json::Bool(*b),
            HostValue::Int(i) => Json::from(*i),
            HostValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            HostValue::String(s) => Json::String(s.clone()),
            HostValue::Array(items) => Json::Array(items.iter().map(HostValue::to_json).collect()),
            HostValue::Object(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Copy of a JSON document
    ///
    /// Integral numbers in the i32 range become [`HostValue::Int`], every
    /// other number [`HostValue::Double`].
    pub fn from_json(json: &serde_json::Value) -> HostValue {
        use serde_json::Value as Json;

        match json {
            Json::Null => HostValue::Null,
            Json::Bool(b) => HostValue::Bool(*b),
            Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => HostValue::Int(i),
                None => HostValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => HostValue::String(s.clone()),
            Json::Array(items) => HostValue::Array(items.iter().map(HostValue::from_json).collect()),
            Json::Object(map) => HostValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), HostValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Double(d) => write!(f, "{}", d),
            HostValue::String(s) => write!(f, "{:?}", s),
            HostValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            HostValue::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            HostValue::Function => write!(f, "[function]"),
            HostValue::External(addr) => write!(f, "External({:#x})", addr),
        }
    }
}

impl<'c> Value<'c> {
    /// Deep copy into host data
    ///
    /// Reading properties can run getters, so this can raise a script
    /// exception. Nesting deeper than [`MAX_DEPTH`] fails with
    /// [`MarshalError::MaxDepthExceeded`].
    pub fn to_host(&self) -> Result<'c, HostValue> {
        self.to_host_at(0)
    }

    fn to_host_at(&self, depth: usize) -> Result<'c, HostValue> {
        if depth > MAX_DEPTH {
            return Err(MarshalError::MaxDepthExceeded(MAX_DEPTH).into());
        }
        let ctx = self.context();
        let cast = |e| ctx.runtime_error(e);

        Ok(match self.get_type() {
            JsType::Null => HostValue::Null,
            JsType::Bool => HostValue::Bool(self.as_bool().map_err(cast)?),
            JsType::Int => HostValue::Int(self.as_int().map_err(cast)?),
            JsType::Double => HostValue::Double(self.as_double().map_err(cast)?),
            JsType::String => HostValue::String(self.as_string().map_err(cast)?.to_rust_string()?),
            JsType::Function => HostValue::Function,
            JsType::External => HostValue::External(self.as_external().map_err(cast)?.value() as usize),
            JsType::Array => {
                let array = self.as_array().map_err(cast)?;
                let mut items = Vec::new();
                for item in array.to_vec()? {
                    items.push(item.to_host_at(depth + 1)?);
                }
                HostValue::Array(items)
            }
            JsType::Object => {
                let object = self.as_object().map_err(cast)?;
                let mut entries = Vec::new();
                for key in object.key_names()? {
                    let item = object.get(&key)?;
                    entries.push((key, item.to_host_at(depth + 1)?));
                }
                HostValue::Object(entries)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextOptions;
    use crate::error::Error;

    fn ctx() -> Context {
        Context::new(ContextOptions::default()).unwrap()
    }

    #[test]
    fn test_nested_copy_keeps_order() {
        let ctx = ctx();
        let value = ctx
            .evaluate("nested.js", "({ b: [1, 2.5, 'x'], a: { ok: true, none: null } })")
            .unwrap();
        let host = value.to_host().unwrap();
        assert_eq!(
            host,
            HostValue::Object(vec![
                (
                    "b".to_owned(),
                    HostValue::Array(vec![
                        HostValue::Int(1),
                        HostValue::Double(2.5),
                        HostValue::String("x".to_owned()),
                    ])
                ),
                (
                    "a".to_owned(),
                    HostValue::Object(vec![
                        ("ok".to_owned(), HostValue::Bool(true)),
                        ("none".to_owned(), HostValue::Null),
                    ])
                ),
            ])
        );
        assert_eq!(host.to_string(), r#"{b: [1, 2.5, "x"], a: {ok: true, none: null}}"#);
    }

    #[test]
    fn test_cycle_hits_depth_limit() {
        let ctx = ctx();
        let value = ctx.evaluate("cycle.js", "var o = {}; o.self = o; o").unwrap();
        let err = value.to_host().unwrap_err();
        assert!(matches!(err, Error::Marshal(MarshalError::MaxDepthExceeded(MAX_DEPTH))));
    }

    #[test]
    fn test_into_value_and_back() {
        let ctx = ctx();
        let host = HostValue::from_json(&serde_json::json!({
            "name": "widget",
            "sizes": [1, 2, 3],
            "ratio": 0.75
        }));
        let value = host.into_value(&ctx).unwrap();
        ctx.global_object().set("w", &value).unwrap();
        let total = ctx.evaluate("sum.js", "w.sizes.reduce(function (a, b) { return a + b; }, 0)").unwrap();
        assert_eq!(total.as_int().unwrap(), 6);
        assert_eq!(value.to_host().unwrap(), host);
    }

    #[test]
    fn test_functions_do_not_unmarshal() {
        let ctx = ctx();
        let f = ctx.evaluate("fn.js", "(function () {})").unwrap();
        let host = f.to_host().unwrap();
        assert_eq!(host, HostValue::Function);
        assert!(matches!(
            host.into_value(&ctx),
            Err(Error::Marshal(MarshalError::Unmarshallable("function")))
        ));
    }

    #[test]
    fn test_to_json() {
        let host = HostValue::Object(vec![
            ("n".to_owned(), HostValue::Int(3)),
            ("nan".to_owned(), HostValue::Double(f64::NAN)),
            ("f".to_owned(), HostValue::Function),
        ]);
        assert_eq!(host.to_json(), serde_json::json!({ "n": 3, "nan": null, "f": null }));
        assert_eq!(host.get("n"), Some(&HostValue::Int(3)));
        assert_eq!(host.type_name(), "object");
    }
}
