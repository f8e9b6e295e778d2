use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{Handler, HandlerContext, HandlerId, HandlerResult, Result, TextGenerator};
use tracing::info;

use super::types::LabReport;

pub const LAB_RESULTS_PROMPT: &str = r#"You are a lab result interpreter.
Input: lab values quoted by the user (free text or structured).
1) Compare each value to its reference range.
2) Flag out-of-range values and their clinical significance in plain language.

Respond with ONLY this JSON:
{
  "labs": [{"name": "...", "value": "...", "units": "...", "ref_range": "...", "flag": "normal|high|low"}],
  "summary": "...",
  "emergency": false
}

Set "emergency" to true for immediately dangerous values (e.g. K+ > 6.0, INR > 5.0).
Do not mix text and JSON in your response."#;

fn render_report(report: &LabReport) -> String {
    let mut lines = Vec::new();
    if !report.summary.is_empty() {
        lines.push(report.summary.clone());
    }
    for lab in &report.labs {
        let mut line = format!("- {}: {} {}", lab.name, lab.value, lab.units);
        if !lab.ref_range.is_empty() {
            line.push_str(&format!(" (reference {})", lab.ref_range));
        }
        if !lab.flag.is_empty() && lab.flag != "normal" {
            line.push_str(&format!(" [{}]", lab.flag.to_uppercase()));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Specialist interpreting lab values against reference ranges.
pub struct LabResultsHandler {
    generator: Arc<dyn TextGenerator>,
}

impl LabResultsHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for LabResultsHandler {
    fn id(&self) -> HandlerId {
        HandlerId::LabResults
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let response = self
            .generator
            .generate(LAB_RESULTS_PROMPT, ctx.history, ctx.input)
            .await?;

        match serde_json::from_str::<LabReport>(response.trim()) {
            Ok(report) => {
                info!(
                    session_id = ctx.session_id,
                    labs = report.labs.len(),
                    emergency = report.emergency,
                    "lab report parsed"
                );
                let text = render_report(&report);
                let payload = serde_json::to_value(&report).ok();
                Ok(HandlerResult::with_payload(text, payload))
            }
            Err(_) => Ok(HandlerResult::end(response)),
        }
    }
}
