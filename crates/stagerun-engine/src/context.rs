//! Invocation context extraction and component naming.

use serde::Deserialize;
use stagerun_types::event::{InvocationMeta, StageEvent};
use stagerun_types::ids::{EnvName, ManifestKey, RunId};

/// Errors raised while turning an invocation into an [`InvocationContext`].
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The event is not shaped like a stage event.
    #[error("malformed invocation event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is present but blank.
    #[error("event field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// The function name has fewer than two dash-delimited segments.
    #[error("function name '{0}' has no component segment (expected at least two '-'-separated parts)")]
    NoComponentSegment(String),

    /// The component segment of the function name is empty.
    #[error("function name '{0}' has an empty component segment")]
    EmptyComponent(String),
}

/// Everything one invocation needs, parsed once and discarded on return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub bucket: String,
    pub key: String,
    pub team: String,
    pub dataset: String,
    pub stage: String,
    pub manifest_key: ManifestKey,
    pub run_id: RunId,
    pub env: EnvName,
    /// Display label for status messages, derived from the function name.
    pub component: String,
}

impl InvocationContext {
    /// Build a context from a typed event and the host's invocation metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a field is blank or the component can't
    /// be derived from `meta.function_name`.
    pub fn from_event(event: &StageEvent, meta: &InvocationMeta) -> Result<Self, ContextError> {
        let body = &event.body;
        let fields: [(&'static str, &str); 8] = [
            ("bucket", body.bucket.as_str()),
            ("key", body.key.as_str()),
            ("team", body.team.as_str()),
            ("pipeline_stage", body.stage.as_str()),
            ("dataset", body.dataset.as_str()),
            ("manifest_ddb_key", body.manifest_key.as_str()),
            ("env", body.env.as_str()),
            ("peh_id", body.run_id.as_str()),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ContextError::EmptyField(*name));
        }

        Ok(Self {
            bucket: body.bucket.clone(),
            key: body.key.clone(),
            team: body.team.clone(),
            dataset: body.dataset.clone(),
            stage: body.stage.clone(),
            manifest_key: body.manifest_key.clone(),
            run_id: body.run_id.clone(),
            env: body.env.clone(),
            component: derive_component(&meta.function_name)?,
        })
    }

    /// Build a context from a raw JSON event.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Malformed`] if the event doesn't deserialize,
    /// otherwise as [`InvocationContext::from_event`].
    pub fn from_json(
        event: &serde_json::Value,
        meta: &InvocationMeta,
    ) -> Result<Self, ContextError> {
        let event = StageEvent::deserialize(event)?;
        Self::from_event(&event, meta)
    }

    /// `"<stage> <component> Processing"`.
    #[must_use]
    pub fn processing_message(&self) -> String {
        format!("{} {} Processing", self.stage, self.component)
    }

    /// `"<stage> <component> Error: <description>"`.
    #[must_use]
    pub fn error_comment(&self, description: &str) -> String {
        format!("{} {} Error: {}", self.stage, self.component, description)
    }
}

/// Derive the component label from a dash-delimited function name.
///
/// Takes the second-to-last segment and title-cases it:
/// `"org-pipeline-stageA-process"` becomes `"Stagea"`.
///
/// # Errors
///
/// Returns [`ContextError::NoComponentSegment`] when there are fewer than
/// two segments and [`ContextError::EmptyComponent`] when the segment is
/// blank.
pub fn derive_component(function_name: &str) -> Result<String, ContextError> {
    let segments: Vec<&str> = function_name.split('-').collect();
    if segments.len() < 2 {
        return Err(ContextError::NoComponentSegment(function_name.to_string()));
    }
    let segment = segments[segments.len() - 2];
    if segment.trim().is_empty() {
        return Err(ContextError::EmptyComponent(function_name.to_string()));
    }
    Ok(title_case(segment))
}

/// Uppercase every character that follows an uncased one, lowercase the
/// rest. Cased means it has an upper or lower case form.
///
/// `"stageA"` -> `"Stagea"`, `"stage_a"` -> `"Stage_A"`, `"2nd"` -> `"2Nd"`,
/// `"中a"` -> `"中A"`.
#[must_use]
pub fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_cased = false;
    for ch in word.chars() {
        if prev_cased {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        prev_cased = ch.is_uppercase() || ch.is_lowercase();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> InvocationMeta {
        InvocationMeta::new("org-pipeline-stageA-process")
    }

    fn event_json() -> serde_json::Value {
        json!({
            "body": {
                "bucket": "raw",
                "key": "engineering/legislators/persons.json",
                "team": "engineering",
                "pipeline_stage": "StageA",
                "dataset": "legislators",
                "manifest_ddb_key": "legislators#persons.json",
                "env": "dev",
                "peh_id": "run-1"
            }
        })
    }

    #[test]
    fn test_component_from_function_name() {
        assert_eq!(derive_component("org-pipeline-stageA-process").unwrap(), "Stagea");
        assert_eq!(derive_component("a-b").unwrap(), "A");
        assert_eq!(derive_component("sdlf-STAGEB-routing").unwrap(), "Stageb");
    }

    #[test]
    fn test_component_needs_two_segments() {
        let err = derive_component("process").unwrap_err();
        assert!(matches!(err, ContextError::NoComponentSegment(ref n) if n == "process"));
        assert!(derive_component("").is_err());
    }

    #[test]
    fn test_component_segment_must_not_be_empty() {
        let err = derive_component("org--process").unwrap_err();
        assert!(matches!(err, ContextError::EmptyComponent(_)));
    }

    #[test]
    fn test_title_case_follows_letter_boundaries() {
        assert_eq!(title_case("stageA"), "Stagea");
        assert_eq!(title_case("stage_a"), "Stage_A");
        assert_eq!(title_case("2nd"), "2Nd");
        assert_eq!(title_case("ÉTAPE"), "Étape");
    }

    #[test]
    fn test_uncased_letters_start_a_new_word() {
        assert_eq!(title_case("中a"), "中A");
        assert_eq!(title_case("ステージb"), "ステージB");
        assert_eq!(derive_component("org-数据a-process").unwrap(), "数据A");
    }

    #[test]
    fn test_context_from_json() {
        let ctx = InvocationContext::from_json(&event_json(), &meta()).unwrap();
        assert_eq!(ctx.stage, "StageA");
        assert_eq!(ctx.component, "Stagea");
        assert_eq!(ctx.run_id.as_str(), "run-1");
        assert_eq!(ctx.processing_message(), "StageA Stagea Processing");
        assert_eq!(ctx.error_comment("boom"), "StageA Stagea Error: boom");
    }

    #[test]
    fn test_missing_body_field_is_malformed() {
        let mut event = event_json();
        event["body"].as_object_mut().unwrap().remove("peh_id");
        let err = InvocationContext::from_json(&event, &meta()).unwrap_err();
        assert!(matches!(err, ContextError::Malformed(_)));
        assert!(err.to_string().contains("peh_id"), "got: {err}");
    }

    #[test]
    fn test_blank_field_is_rejected() {
        let mut event = event_json();
        event["body"]["team"] = json!("  ");
        let err = InvocationContext::from_json(&event, &meta()).unwrap_err();
        assert!(matches!(err, ContextError::EmptyField("team")));
    }

    #[test]
    fn test_bad_function_name_fails_after_fields_check() {
        let meta = InvocationMeta::new("lambda");
        let err = InvocationContext::from_json(&event_json(), &meta).unwrap_err();
        assert!(matches!(err, ContextError::NoComponentSegment(_)));
    }
}
