//! Opaque identifier newtypes.
//!
//! These wrap plain strings so ledger, manifest, and environment keys
//! cannot be swapped for one another at call sites.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identifier of a pipeline run in the execution ledger.
///
/// Deserializes from either a JSON string or an integer, since schedulers
/// disagree on how they forward the run id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for RunId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(D::Error::custom(format!(
                "run id must be a string or integer, got {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ManifestKey
// ---------------------------------------------------------------------------

/// Key of a record in the manifest control table.
///
/// A JSON string is used verbatim. Any other JSON value (typically a
/// composite `{"dataset_name": .., "datafile_name": ..}` key) is stored as
/// its compact rendering with object keys sorted, so the same composite
/// key always addresses the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ManifestKey(String);

impl ManifestKey {
    /// Create a new manifest key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build a key from an arbitrary JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self(s.clone()),
            other => Self(other.to_string()),
        }
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ManifestKey {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl<'de> Deserialize<'de> for ManifestKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Err(D::Error::custom("manifest key must not be null"));
        }
        Ok(Self::from_value(&value))
    }
}

// ---------------------------------------------------------------------------
// EnvName
// ---------------------------------------------------------------------------

/// Deployment environment name (e.g. `"dev"`), used to pick a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvName(String);

impl EnvName {
    /// Create a new environment name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for EnvName {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_display_and_as_str() {
        let id = RunId::new("b0c1");
        assert_eq!(id.as_str(), "b0c1");
        assert_eq!(id.to_string(), "b0c1");
    }

    #[test]
    fn test_run_id_accepts_integer() {
        let id: RunId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn test_run_id_rejects_object() {
        let err = serde_json::from_str::<RunId>(r#"{"id": 1}"#).unwrap_err();
        assert!(err.to_string().contains("run id"));
    }

    #[test]
    fn test_manifest_key_string_is_verbatim() {
        let key: ManifestKey = serde_json::from_str(r#""legislators#persons.json""#).unwrap();
        assert_eq!(key.as_str(), "legislators#persons.json");
    }

    #[test]
    fn test_manifest_key_composite_is_order_independent() {
        let a: ManifestKey =
            serde_json::from_str(r#"{"dataset_name": "d", "datafile_name": "f"}"#).unwrap();
        let b: ManifestKey =
            serde_json::from_str(r#"{"datafile_name": "f", "dataset_name": "d"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"datafile_name":"f","dataset_name":"d"}"#);
    }

    #[test]
    fn test_manifest_key_rejects_null() {
        assert!(serde_json::from_str::<ManifestKey>("null").is_err());
    }

    #[test]
    fn test_env_name_serde_transparent() {
        let json = serde_json::to_string(&EnvName::new("dev")).unwrap();
        assert_eq!(json, "\"dev\"");
    }
}
