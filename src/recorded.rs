use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::collaborators::{
    CallResult, ClaimsEvidence, Collaborators, RoleTag, TermExtraction, VisualCheck,
};
use crate::error::{CollaboratorError, Result};
use crate::heuristic::HeuristicCollaborators;
use crate::models::{LabelFix, Signal, Tone, Window};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordedWindow {
    pub window_id: usize,
    #[serde(default)]
    pub terms: Option<TermExtraction>,
    #[serde(default)]
    pub claims: Option<ClaimsEvidence>,
    #[serde(default)]
    pub role: Option<RoleTag>,
    #[serde(default)]
    pub definitions: BTreeMap<String, bool>,
    #[serde(default)]
    pub visual: Option<VisualCheck>,
    #[serde(default)]
    pub label: Option<LabelFix>,
    #[serde(default)]
    pub tone: Option<Tone>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecordedFile {
    windows: Vec<RecordedWindow>,
}

/// Replays collaborator responses captured from an earlier run, keyed by window id.
pub struct RecordedCollaborators {
    windows: BTreeMap<usize, RecordedWindow>,
    fallback: Option<HeuristicCollaborators>,
}

impl RecordedCollaborators {
    pub fn new(windows: Vec<RecordedWindow>, fallback: Option<HeuristicCollaborators>) -> Self {
        Self {
            windows: windows.into_iter().map(|w| (w.window_id, w)).collect(),
            fallback,
        }
    }

    pub fn from_json(content: &str, fallback: Option<HeuristicCollaborators>) -> Result<Self> {
        let file: RecordedFile = serde_json::from_str(content)?;
        Ok(Self::new(file.windows, fallback))
    }

    pub fn load(path: &Path, fallback: Option<HeuristicCollaborators>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?, fallback)
    }

    fn missing(operation: &str, window_id: usize) -> CollaboratorError {
        CollaboratorError::Unavailable(format!(
            "no recorded {operation} response for window {window_id}"
        ))
    }
}

#[async_trait]
impl Collaborators for RecordedCollaborators {
    async fn extract_terms(&self, window: &Window) -> CallResult<TermExtraction> {
        match (self.windows.get(&window.id).and_then(|w| w.terms.clone()), &self.fallback) {
            (Some(terms), _) => Ok(terms),
            (None, Some(fallback)) => fallback.extract_terms(window).await,
            (None, None) => Err(Self::missing("extract_terms", window.id)),
        }
    }

    async fn classify_claims_evidence(&self, window: &Window) -> CallResult<ClaimsEvidence> {
        match (self.windows.get(&window.id).and_then(|w| w.claims.clone()), &self.fallback) {
            (Some(claims), _) => Ok(claims),
            (None, Some(fallback)) => fallback.classify_claims_evidence(window).await,
            (None, None) => Err(Self::missing("classify_claims_evidence", window.id)),
        }
    }

    async fn role_tag(&self, window: &Window) -> CallResult<RoleTag> {
        match (self.windows.get(&window.id).and_then(|w| w.role.clone()), &self.fallback) {
            (Some(role), _) => Ok(role),
            (None, Some(fallback)) => fallback.role_tag(window).await,
            (None, None) => Err(Self::missing("role_tag", window.id)),
        }
    }

    async fn check_term_definition(&self, window: &Window, term: &str) -> CallResult<bool> {
        let recorded = self
            .windows
            .get(&window.id)
            .and_then(|w| w.definitions.get(term).copied());
        match (recorded, &self.fallback) {
            (Some(defined), _) => Ok(defined),
            (None, Some(fallback)) => fallback.check_term_definition(window, term).await,
            (None, None) => Err(Self::missing("check_term_definition", window.id)),
        }
    }

    async fn visual_mismatch(&self, window: &Window) -> CallResult<VisualCheck> {
        match (self.windows.get(&window.id).and_then(|w| w.visual.clone()), &self.fallback) {
            (Some(visual), _) => Ok(visual),
            (None, Some(fallback)) => fallback.visual_mismatch(window).await,
            (None, None) => Err(Self::missing("visual_mismatch", window.id)),
        }
    }

    async fn label_and_fix(
        &self,
        window: &Window,
        triggered: &[Signal],
        terms: &[String],
    ) -> CallResult<LabelFix> {
        match (self.windows.get(&window.id).and_then(|w| w.label.clone()), &self.fallback) {
            (Some(label), _) => Ok(label),
            (None, Some(fallback)) => fallback.label_and_fix(window, triggered, terms).await,
            (None, None) => Err(Self::missing("label_and_fix", window.id)),
        }
    }

    async fn roast_variants(&self, remediation: &LabelFix) -> CallResult<Tone> {
        let recorded = self
            .windows
            .values()
            .filter(|w| w.label.as_ref() == Some(remediation))
            .find_map(|w| w.tone.clone());
        match (recorded, &self.fallback) {
            (Some(tone), _) => Ok(tone),
            (None, Some(fallback)) => fallback.roast_variants(remediation).await,
            (None, None) => Err(CollaboratorError::Unavailable(format!(
                "no recorded tone variants for \"{}\"",
                remediation.label
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    const RECORDED: &str = r#"{
        "windows": [
            {
                "window_id": 1,
                "terms": {"terms": ["Marengo", "RAG"]},
                "role": {"role": "demo", "confidence": 0.9},
                "definitions": {"RAG": false},
                "visual": {"severity": 2},
                "label": {"label": "Buzzword soup", "explanation": "Too many terms", "fix": "Define RAG"},
                "tone": {"kind": "k", "honest": "h", "brutal": "b"}
            }
        ]
    }"#;

    fn window(id: usize) -> Window {
        Window {
            id,
            start_sec: 0.0,
            end_sec: 10.0,
            text: "RAG is retrieval augmented generation".to_string(),
        }
    }

    #[tokio::test]
    async fn replays_recorded_responses() {
        let recorded = RecordedCollaborators::from_json(RECORDED, None).unwrap();
        let terms = recorded.extract_terms(&window(1)).await.unwrap();
        assert_eq!(terms.terms, vec!["Marengo", "RAG"]);
        assert_eq!(recorded.role_tag(&window(1)).await.unwrap().role, Role::Demo);
        assert!(!recorded.check_term_definition(&window(1), "RAG").await.unwrap());
        assert_eq!(recorded.visual_mismatch(&window(1)).await.unwrap().severity, 2.0);

        let label = recorded.label_and_fix(&window(1), &[], &[]).await.unwrap();
        let tone = recorded.roast_variants(&label).await.unwrap();
        assert_eq!(tone.brutal, "b");
    }

    #[tokio::test]
    async fn missing_entries_are_unavailable_without_fallback() {
        let recorded = RecordedCollaborators::from_json(RECORDED, None).unwrap();
        let err = recorded.classify_claims_evidence(&window(1)).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
        assert!(recorded.extract_terms(&window(7)).await.is_err());
    }

    #[tokio::test]
    async fn missing_entries_use_heuristic_fallback() {
        let recorded =
            RecordedCollaborators::from_json(RECORDED, Some(HeuristicCollaborators)).unwrap();
        assert!(recorded.check_term_definition(&window(4), "RAG").await.unwrap());
    }
}
