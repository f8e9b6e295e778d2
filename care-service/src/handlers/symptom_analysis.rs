use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{
    Handler, HandlerContext, HandlerId, HandlerResult, NextAction, Result, RouteStep,
    TextGenerator,
};
use tracing::info;

use super::types::SymptomAssessment;

pub const SYMPTOM_PROMPT: &str = r#"You are a symptom analysis specialist. Your single responsibility is to:
1) Convert the user's free-text symptom description into a structured representation.
2) Run an initial differential with at least 3 candidate causes ranked by confidence.
3) Give a 1-2 sentence rationale per candidate and list red flags that would mandate emergency referral.

Respond with ONLY this JSON:
{
  "diagnoses": [{"name": "...", "confidence": "high|medium|low", "rationale": "..."}],
  "red_flags": ["..."],
  "emergency": false
}

Set "emergency" to true only for life-threatening presentations.
Never provide prescriptions. Do not mix text and JSON in your response."#;

fn render_assessment(assessment: &SymptomAssessment) -> String {
    let mut lines = vec!["Here is an initial read of your symptoms (not a diagnosis):".to_string()];
    for diagnosis in &assessment.diagnoses {
        let confidence = if diagnosis.confidence.is_empty() {
            String::new()
        } else {
            format!(" ({} confidence)", diagnosis.confidence)
        };
        lines.push(format!(
            "- {}{}: {}",
            diagnosis.name, confidence, diagnosis.rationale
        ));
    }
    if !assessment.red_flags.is_empty() {
        lines.push(format!(
            "Seek care promptly if you notice: {}.",
            assessment.red_flags.join("; ")
        ));
    }
    lines.join("\n")
}

/// Specialist turning symptom descriptions into a ranked differential.
pub struct SymptomAnalysisHandler {
    generator: Arc<dyn TextGenerator>,
}

impl SymptomAnalysisHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for SymptomAnalysisHandler {
    fn id(&self) -> HandlerId {
        HandlerId::SymptomAnalysis
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let response = self
            .generator
            .generate(SYMPTOM_PROMPT, ctx.history, ctx.input)
            .await?;

        match serde_json::from_str::<SymptomAssessment>(response.trim()) {
            Ok(assessment) => {
                let escalate = assessment.emergency || !assessment.red_flags.is_empty();
                info!(
                    session_id = ctx.session_id,
                    diagnoses = assessment.diagnoses.len(),
                    escalate,
                    "symptom assessment parsed"
                );
                let text = render_assessment(&assessment);
                let payload = serde_json::to_value(&assessment).ok();
                let mut result = HandlerResult::with_payload(text, payload);
                if escalate {
                    // Flagged findings go to the referral specialist with
                    // this assessment as its input.
                    result.next =
                        NextAction::Delegate(vec![RouteStep::chained("specialist_referral")]);
                }
                Ok(result)
            }
            // Plain prose still answers the user.
            Err(_) => Ok(HandlerResult::end(response)),
        }
    }
}
