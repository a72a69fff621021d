use std::fmt;

use crate::constants::KEY_SEPARATOR;
use crate::Error;
use crate::Result;

/// A validated path in the coordination service's key namespace.
///
/// Always starts with a single `/` and never contains `//`.
/// Only [`normalize`] constructs one, so holding a `ConfigKey` means the
/// key is safe to send over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConfigKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.0
    }
}

impl TryFrom<&str> for ConfigKey {
    type Error = Error;

    fn try_from(raw: &str) -> Result<Self> {
        normalize(raw)
    }
}

/// Normalizes a logical key into the remote namespace.
///
/// - a missing leading `/` is prepended
/// - exactly one trailing `/` is stripped
/// - a result containing `//` is rejected, distinct paths are never merged
/// - an empty result is rejected
pub fn normalize(raw: &str) -> Result<ConfigKey> {
    let mut key = String::with_capacity(raw.len() + 1);
    if !raw.starts_with(KEY_SEPARATOR) {
        key.push(KEY_SEPARATOR);
    }
    key.push_str(raw);

    if key.ends_with(KEY_SEPARATOR) {
        key.pop();
    }

    if key.is_empty() {
        return Err(Error::InvalidKey {
            raw: raw.to_string(),
            reason: "key is empty",
        });
    }

    if key.contains("//") {
        return Err(Error::InvalidKey {
            raw: raw.to_string(),
            reason: "key contains an empty path segment",
        });
    }

    Ok(ConfigKey(key))
}
