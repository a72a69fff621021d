use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::ConfigKey;
use crate::Error;
use crate::Result;

/// Checks that `payload` is a JSON document whose top level is an object
/// or an array. Bare scalars (`123`, `"text"`, `null`) are rejected.
pub fn validate_json(payload: &[u8]) -> Result<()> {
    let document: Value =
        serde_json::from_slice(payload).map_err(|e| Error::InvalidValue(e.to_string()))?;

    match document {
        Value::Object(_) | Value::Array(_) => Ok(()),
        other => Err(Error::InvalidValue(format!(
            "top level must be an object or array, found {}",
            json_kind(&other)
        ))),
    }
}

/// Decodes a stored payload into `T`.
///
/// `key` is only used to give the error some context.
pub fn decode<T>(
    key: &ConfigKey,
    payload: &[u8],
) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(payload).map_err(|source| Error::Decode {
        key: key.to_string(),
        source,
    })
}

/// Serializes `value` into bytes that pass [`validate_json`].
pub fn encode<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(Error::Encode)?;
    validate_json(&bytes)?;
    Ok(bytes)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
