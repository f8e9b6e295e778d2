use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{Handler, HandlerContext, HandlerId, HandlerResult, Result, TextGenerator};
use tracing::info;

use super::types::InteractionReport;

pub const MEDICATION_PROMPT: &str = r#"You are a medication and interaction specialist.
Input: medication names, dosages and patient context mentioned by the user.
1) Check pairwise interactions and contraindications.
2) Give an overall verdict: OK, CAUTION or STOP.
3) If a medication cannot be identified, mark it unknown but continue with the rest.

Respond with ONLY this JSON:
{
  "interactions": [{"drug_a": "...", "drug_b": "...", "severity": "minor|moderate|major", "explanation": "..."}],
  "summary": "OK|CAUTION|STOP",
  "notes": ["..."]
}

Never recommend dosing beyond standard ranges; flag unusual dosing for clinician review.
Do not mix text and JSON in your response."#;

fn render_report(report: &InteractionReport) -> String {
    let mut lines = Vec::new();
    match report.summary.as_str() {
        "OK" => lines.push("No concerning interactions found between these medications.".into()),
        "CAUTION" => lines.push(
            "Some combinations deserve caution; please review the details below.".to_string(),
        ),
        "STOP" => lines.push(
            "A potentially serious combination was found; contact your clinician before the next dose.".to_string(),
        ),
        _ => {}
    }
    for interaction in &report.interactions {
        lines.push(format!(
            "- {} + {} ({}): {}",
            interaction.drug_a, interaction.drug_b, interaction.severity, interaction.explanation
        ));
    }
    for note in &report.notes {
        lines.push(format!("Note: {note}"));
    }
    lines.join("\n")
}

/// Specialist checking a medication list for interactions.
pub struct MedicationInteractionsHandler {
    generator: Arc<dyn TextGenerator>,
}

impl MedicationInteractionsHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for MedicationInteractionsHandler {
    fn id(&self) -> HandlerId {
        HandlerId::MedicationInteractions
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let response = self
            .generator
            .generate(MEDICATION_PROMPT, ctx.history, ctx.input)
            .await?;

        match serde_json::from_str::<InteractionReport>(response.trim()) {
            Ok(report) => {
                info!(
                    session_id = ctx.session_id,
                    interactions = report.interactions.len(),
                    verdict = %report.summary,
                    "interaction report parsed"
                );
                let text = render_report(&report);
                let payload = serde_json::to_value(&report).ok();
                Ok(HandlerResult::with_payload(text, payload))
            }
            Err(_) => Ok(HandlerResult::end(response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::Interaction;

    #[test]
    fn rendering_leads_with_the_verdict() {
        let report = InteractionReport {
            interactions: vec![Interaction {
                drug_a: "warfarin".into(),
                drug_b: "ibuprofen".into(),
                severity: "major".into(),
                explanation: "increased bleeding risk".into(),
            }],
            summary: "STOP".into(),
            notes: vec!["verify INR this week".into()],
        };
        let text = render_report(&report);
        assert!(text.starts_with("A potentially serious combination"));
        assert!(text.contains("warfarin + ibuprofen"));
        assert!(text.contains("Note: verify INR this week"));
    }
}
