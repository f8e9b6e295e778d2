use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::handler::HandlerId;
use crate::store::{Turn, TurnRole};

/// Collection name used for persisted encounter notes.
pub const DOCUMENT_COLLECTION: &str = "clinical_documents";

// Scrub patterns for direct identifiers. Specific patterns run before the
// name heuristic so that redaction tokens are never re-matched.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid regex")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b|\b\d{3}[-.\s]\d{4}\b").expect("Invalid regex")
});
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("Invalid regex"));
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,5}\s[\w\s.,#-]+?(?:Street|St|Avenue|Ave|Road|Rd|Lane|Ln|Blvd|Drive|Dr)\b")
        .expect("Invalid regex")
});
static MRN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bMRN[:\s]*\d+\b").expect("Invalid regex"));
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bID[:\s]*\d+\b").expect("Invalid regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s[A-Z][a-z]+)+\b").expect("Invalid regex"));

/// Result of scrubbing one text segment.
#[derive(Debug, Clone)]
pub struct DeidOutcome {
    pub text: String,
    pub redactions: usize,
}

fn apply(re: &Regex, token: &str, text: String, redactions: &mut usize) -> String {
    let count = re.find_iter(&text).count();
    if count == 0 {
        return text;
    }
    *redactions += count;
    re.replace_all(&text, token).into_owned()
}

/// Remove direct identifiers from free text, replacing each with a
/// redaction token.
pub fn deidentify(text: &str) -> DeidOutcome {
    let mut redactions = 0usize;
    let mut scrubbed = text.to_string();
    scrubbed = apply(&EMAIL_RE, "[REDACTED_EMAIL]", scrubbed, &mut redactions);
    scrubbed = apply(&PHONE_RE, "[REDACTED_PHONE]", scrubbed, &mut redactions);
    scrubbed = apply(&DATE_RE, "[REDACTED_DATE]", scrubbed, &mut redactions);
    scrubbed = apply(&ADDRESS_RE, "[REDACTED_ADDRESS]", scrubbed, &mut redactions);
    scrubbed = apply(&MRN_RE, "[REDACTED_MRN]", scrubbed, &mut redactions);
    scrubbed = apply(&ID_RE, "[REDACTED_ID]", scrubbed, &mut redactions);
    scrubbed = apply(&NAME_RE, "[REDACTED_NAME]", scrubbed, &mut redactions);
    DeidOutcome {
        text: scrubbed,
        redactions,
    }
}

/// Detection re-run over already scrubbed text. A hit means the scrub
/// could not be trusted for this segment.
pub fn contains_identifiers(text: &str) -> bool {
    EMAIL_RE.is_match(text)
        || PHONE_RE.is_match(text)
        || DATE_RE.is_match(text)
        || ADDRESS_RE.is_match(text)
        || MRN_RE.is_match(text)
        || ID_RE.is_match(text)
        || NAME_RE.is_match(text)
}

/// When the documentation stage fires for a conversation.
#[derive(Debug, Clone)]
pub struct DocumentationPolicy {
    trigger_command: String,
}

impl DocumentationPolicy {
    pub fn new(trigger_command: impl Into<String>) -> Self {
        Self {
            trigger_command: trigger_command.into(),
        }
    }

    pub fn should_document(&self, message: &str) -> bool {
        message.trim().eq_ignore_ascii_case(&self.trigger_command)
    }
}

impl Default for DocumentationPolicy {
    fn default() -> Self {
        Self::new("DONE")
    }
}

/// Structured encounter note. Immutable after persistence; the persisted
/// form never contains direct identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub id: String,
    pub source_session: String,
    pub created_at: DateTime<Utc>,
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    /// Plain-language view for the patient.
    pub patient_summary: String,
    /// Technical view for the clinician.
    pub clinician_summary: String,
}

/// Trait for the external document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, collection: &str, document: ClinicalDocument) -> Result<String>;
    async fn get(&self, collection: &str, id: &str) -> Result<Option<ClinicalDocument>>;
}

/// In-memory implementation of `DocumentStore`.
pub struct InMemoryDocumentStore {
    documents: DashMap<(String, String), ClinicalDocument>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, collection: &str, document: ClinicalDocument) -> Result<String> {
        let id = document.id.clone();
        self.documents
            .insert((collection.to_string(), id.clone()), document);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<ClinicalDocument>> {
        Ok(self
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.clone()))
    }
}

const NOT_DOCUMENTED: &str = "Not documented.";

fn section(parts: Vec<String>) -> String {
    if parts.is_empty() {
        NOT_DOCUMENTED.to_string()
    } else {
        parts.join("\n")
    }
}

fn render_patient_summary(document: &ClinicalDocument) -> String {
    format!(
        "Summary of your visit, in plain language.\n\n\
         What you told us: {}\n\n\
         What was found: {}\n\n\
         Your plan: {}",
        document.subjective, document.assessment, document.plan
    )
}

fn render_clinician_summary(document: &ClinicalDocument) -> String {
    format!(
        "S: {}\nO: {}\nA: {}\nP: {}",
        document.subjective, document.objective, document.assessment, document.plan
    )
}

/// Terminal stage turning a conversation into a persisted encounter note.
///
/// Every free-text segment is scrubbed before it reaches the document; a
/// segment that still matches an identifier pattern after scrubbing is
/// dropped entirely.
pub struct DocumentationPipeline {
    store: Arc<dyn DocumentStore>,
}

impl DocumentationPipeline {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self, session_id: &str, history: &[Turn]) -> Result<ClinicalDocument> {
        let mut subjective = Vec::new();
        let mut objective = Vec::new();
        let mut assessment = Vec::new();
        let mut plan = Vec::new();

        for turn in history {
            let scrubbed = deidentify(&turn.content);
            if contains_identifiers(&scrubbed.text) {
                warn!(
                    session_id,
                    "segment resisted scrubbing, omitting from the note"
                );
                continue;
            }
            match turn.role {
                TurnRole::User => subjective.push(scrubbed.text),
                TurnRole::HandlerInternal => {
                    let author = turn.author.as_deref().and_then(HandlerId::from_name);
                    match author {
                        Some(HandlerId::LabResults) | Some(HandlerId::MedicationInteractions) => {
                            objective.push(scrubbed.text)
                        }
                        Some(HandlerId::SymptomAnalysis) | Some(HandlerId::SpecialistReferral) => {
                            assessment.push(scrubbed.text)
                        }
                        Some(HandlerId::Lifestyle) => plan.push(scrubbed.text),
                        _ => {}
                    }
                }
                // Merged replies restate specialist content already captured
                // through the internal turns.
                TurnRole::Assistant => {}
            }
        }

        let mut document = ClinicalDocument {
            id: Uuid::new_v4().to_string(),
            source_session: session_id.to_string(),
            created_at: Utc::now(),
            subjective: section(subjective),
            objective: section(objective),
            assessment: section(assessment),
            plan: section(plan),
            patient_summary: String::new(),
            clinician_summary: String::new(),
        };
        // Both views derive from the structured sections, never from the
        // raw history.
        document.patient_summary = render_patient_summary(&document);
        document.clinician_summary = render_clinician_summary(&document);

        self.store.put(DOCUMENT_COLLECTION, document.clone()).await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_each_identifier_class() {
        let cases = [
            ("reach me at jane.doe@example.com please", "jane.doe@example.com"),
            ("call 555-123-4567 tomorrow", "555-123-4567"),
            ("call 555-1234 tomorrow", "555-1234"),
            ("seen on 12/03/2024 at the clinic", "12/03/2024"),
            ("lives at 42 Elm Street nearby", "42 Elm Street"),
            ("chart MRN: 123456 attached", "MRN: 123456"),
            ("John Smith reported chest pain", "John Smith"),
        ];
        for (input, identifier) in cases {
            let outcome = deidentify(input);
            assert!(
                !outcome.text.contains(identifier),
                "{identifier:?} survived in {:?}",
                outcome.text
            );
            assert!(outcome.redactions >= 1);
        }
    }

    #[test]
    fn injected_identifiers_never_survive() {
        let identifiers = [
            "Mary Johnson",
            "bob@clinic.org",
            "212-555-0100",
            "555-0100",
            "7 Oak Avenue",
        ];
        for a in identifiers {
            for b in identifiers {
                let text = format!("Patient {a} mentioned {b} during intake.");
                let outcome = deidentify(&text);
                for identifier in identifiers {
                    assert!(!outcome.text.contains(identifier));
                }
                assert!(!contains_identifiers(&outcome.text));
            }
        }
    }

    #[test]
    fn clean_text_passes_through() {
        let outcome = deidentify("persistent dry cough for two weeks");
        assert_eq!(outcome.text, "persistent dry cough for two weeks");
        assert_eq!(outcome.redactions, 0);
    }

    #[test]
    fn policy_matches_trigger_case_insensitively() {
        let policy = DocumentationPolicy::default();
        assert!(policy.should_document("DONE"));
        assert!(policy.should_document("  done "));
        assert!(!policy.should_document("I am done talking"));
        let custom = DocumentationPolicy::new("wrap up");
        assert!(custom.should_document("Wrap Up"));
    }

    fn sample_history() -> Vec<Turn> {
        vec![
            Turn::user("I am John Smith, call 555-1234. I have a headache."),
            Turn::handler_internal(
                "symptom_analysis",
                "Likely tension headache; no red flags.",
                None,
            ),
            Turn::handler_internal("lab_results", "CBC unremarkable.", None),
            Turn::handler_internal("lifestyle", "Increase hydration and sleep.", None),
            Turn::assistant("Here is what I found.", Some("symptom_analysis".into())),
        ]
    }

    #[tokio::test]
    async fn pipeline_builds_sections_and_persists() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let pipeline = DocumentationPipeline::new(store.clone());
        let document = pipeline.run("session_1", &sample_history()).await.unwrap();

        assert_eq!(document.source_session, "session_1");
        assert!(document.subjective.contains("headache"));
        assert!(document.objective.contains("CBC"));
        assert!(document.assessment.contains("tension headache"));
        assert!(document.plan.contains("hydration"));
        assert!(document.clinician_summary.starts_with("S: "));
        assert!(document.patient_summary.contains("plain language"));

        let stored = store
            .get(DOCUMENT_COLLECTION, &document.id)
            .await
            .unwrap()
            .expect("document persisted");
        let serialized = serde_json::to_string(&stored).unwrap();
        assert!(!serialized.contains("John Smith"));
        assert!(!serialized.contains("555-1234"));
    }

    #[tokio::test]
    async fn empty_history_yields_placeholder_sections() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let pipeline = DocumentationPipeline::new(store);
        let document = pipeline.run("session_2", &[]).await.unwrap();
        assert_eq!(document.subjective, NOT_DOCUMENTED);
        assert_eq!(document.plan, NOT_DOCUMENTED);
    }
}
