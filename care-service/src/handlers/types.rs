use serde::{Deserialize, Serialize};

/// Routing plan the triage prompt asks the model to emit.
#[derive(Debug, Clone, Deserialize)]
pub struct TriagePlan {
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub name: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub rationale: String,
}

/// Structured output of the symptom specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomAssessment {
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub ref_range: String,
    #[serde(default)]
    pub flag: String,
}

/// Structured output of the lab interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabReport {
    #[serde(default)]
    pub labs: Vec<LabValue>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub drug_a: String,
    pub drug_b: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub explanation: String,
}

/// Structured output of the medication specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionReport {
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// Overall OK | CAUTION | STOP verdict.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Structured output of the lifestyle specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifestylePlan {
    #[serde(default)]
    pub short_term_goals: Vec<String>,
    #[serde(default)]
    pub long_term_goals: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

/// Structured output of the referral specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralAdvice {
    #[serde(default)]
    pub refer: bool,
    #[serde(default)]
    pub specialty: String,
    /// urgent | routine | none.
    #[serde(default)]
    pub urgency: String,
    #[serde(default)]
    pub rationale: String,
}
