//! # Document Codecs
//!
//! Convert raw file bytes to and from the [`Value`] tree.
//!
//! Round trips are value-equivalent, not byte-identical: comments, quoting
//! style and YAML tags do not survive a decode/encode cycle.

use super::value::{Scalar, Value};
use indexmap::IndexMap;
use std::fmt::Debug;
use std::path::Path;
use thiserror::Error;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to parse YAML: {0}")]
    YamlDecode(#[source] serde_yaml::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlEncode(#[source] serde_yaml::Error),
    #[error("failed to parse JSON: {0}")]
    JsonDecode(#[source] serde_json::Error),
    #[error("failed to serialize JSON: {0}")]
    JsonEncode(#[source] serde_json::Error),
    /// Two YAML keys of different types render to the same string (`1` and `"1"`)
    #[error("duplicate map key '{0}' after converting keys to strings")]
    DuplicateKey(String),
}

/// Byte-level document format
pub trait DocumentCodec: Send + Sync + Debug {
    /// Short format name used in logs
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

static YAML: YamlCodec = YamlCodec;
static JSON: JsonCodec = JsonCodec;

/// Pick a codec from the file extension
///
/// `.json` files use JSON; everything else (`.yaml`, `.yml`, no extension) is YAML.
pub fn codec_for_path(path: &Path) -> &'static dyn DocumentCodec {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => &JSON,
        _ => &YAML,
    }
}

impl DocumentCodec for YamlCodec {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let raw: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(CodecError::YamlDecode)?;
        from_yaml(raw)
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(CodecError::YamlEncode)
    }
}

impl DocumentCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let raw: serde_json::Value = serde_json::from_slice(bytes).map_err(CodecError::JsonDecode)?;
        Ok(from_json(raw))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = serde_json::to_vec_pretty(value).map_err(CodecError::JsonEncode)?;
        out.push(b'\n');
        Ok(out)
    }
}

fn from_yaml(raw: serde_yaml::Value) -> Result<Value, CodecError> {
    Ok(match raw {
        serde_yaml::Value::Null => Value::Scalar(Scalar::Null),
        serde_yaml::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
        serde_yaml::Value::Number(n) => Value::Scalar(yaml_number(&n)),
        serde_yaml::Value::String(s) => Value::string(s),
        serde_yaml::Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(from_yaml)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = IndexMap::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = yaml_key(key)?;
                if map.contains_key(&key) {
                    return Err(CodecError::DuplicateKey(key));
                }
                map.insert(key, from_yaml(value)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::Int(i)
    } else if let Some(u) = n.as_u64() {
        Scalar::UInt(u)
    } else {
        Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String, CodecError> {
    match from_yaml(key)? {
        Value::Scalar(scalar) => Ok(scalar.to_string()),
        // Complex keys are rare in manifests; render them as flow YAML
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .map_err(CodecError::YamlEncode),
    }
}

fn from_json(raw: serde_json::Value) -> Value {
    match raw {
        serde_json::Value::Null => Value::Scalar(Scalar::Null),
        serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
        serde_json::Value::Number(n) => Value::Scalar(if let Some(i) = n.as_i64() {
            Scalar::Int(i)
        } else if let Some(u) = n.as_u64() {
            Scalar::UInt(u)
        } else {
            Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
        }),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            Value::Sequence(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(object) => {
            Value::Map(object.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}
