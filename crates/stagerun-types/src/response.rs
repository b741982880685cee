//! Transform response type.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Ordered output of a transform.
///
/// Always holds at least one element. The first element is the status
/// token recorded against the manifest; the rest are passed back to the
/// caller untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransformResponse(Vec<Value>);

/// A transform produced no elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyResponse;

impl std::fmt::Display for EmptyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("transform response must contain at least one element")
    }
}

impl std::error::Error for EmptyResponse {}

impl TransformResponse {
    /// Build a response from its elements.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyResponse`] if `elements` is empty.
    pub fn new(elements: Vec<Value>) -> Result<Self, EmptyResponse> {
        if elements.is_empty() {
            return Err(EmptyResponse);
        }
        Ok(Self(elements))
    }

    /// Response whose single element is `token`.
    #[must_use]
    pub fn single(token: impl Into<Value>) -> Self {
        Self(vec![token.into()])
    }

    /// First element of the response.
    #[must_use]
    pub fn status_token(&self) -> &Value {
        &self.0[0]
    }

    /// Status token rendered for storage: strings verbatim, anything else
    /// as compact JSON.
    #[must_use]
    pub fn status_payload(&self) -> String {
        match self.status_token() {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Elements after the status token.
    #[must_use]
    pub fn extra(&self) -> &[Value] {
        &self.0[1..]
    }

    #[must_use]
    pub fn elements(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn into_elements(self) -> Vec<Value> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for clippy's `len_without_is_empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for TransformResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<Value>::deserialize(deserializer)?;
        Self::new(elements).map_err(D::Error::custom)
    }
}
