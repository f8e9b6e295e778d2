use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{Handler, HandlerContext, HandlerId, HandlerResult, Result, TextGenerator};
use tracing::info;

use super::types::ReferralAdvice;

pub const REFERRAL_PROMPT: &str = r#"You are a specialist referral advisor.
Input: a differential diagnosis or symptom/lab/medication context.
1) Decide whether a specialist referral is advisable.
2) Classify it as urgent or routine and name the most appropriate specialty.
3) Give a one-paragraph rationale citing the key findings.

Respond with ONLY this JSON:
{
  "refer": true,
  "specialty": "Cardiology",
  "urgency": "urgent|routine|none",
  "rationale": "..."
}

Do not mix text and JSON in your response."#;

fn render_advice(advice: &ReferralAdvice) -> String {
    if !advice.refer {
        let mut text = "A specialist referral does not look necessary right now.".to_string();
        if !advice.rationale.is_empty() {
            text.push(' ');
            text.push_str(&advice.rationale);
        }
        return text;
    }
    let urgency = match advice.urgency.as_str() {
        "urgent" => "an urgent",
        "routine" => "a routine",
        _ => "a",
    };
    let mut text = format!(
        "I recommend {} referral to {}.",
        urgency,
        if advice.specialty.is_empty() {
            "an appropriate specialist"
        } else {
            advice.specialty.as_str()
        }
    );
    if !advice.rationale.is_empty() {
        text.push(' ');
        text.push_str(&advice.rationale);
    }
    text
}

/// Specialist deciding whether and where to refer. When chained, it reads
/// the upstream assessment instead of the raw message.
pub struct SpecialistReferralHandler {
    generator: Arc<dyn TextGenerator>,
}

impl SpecialistReferralHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for SpecialistReferralHandler {
    fn id(&self) -> HandlerId {
        HandlerId::SpecialistReferral
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let input = match ctx.carried {
            Some(payload) => format!("{}\n\nUpstream findings: {}", ctx.input, payload),
            None => ctx.input.to_string(),
        };
        let response = self
            .generator
            .generate(REFERRAL_PROMPT, ctx.history, &input)
            .await?;

        match serde_json::from_str::<ReferralAdvice>(response.trim()) {
            Ok(advice) => {
                info!(
                    session_id = ctx.session_id,
                    refer = advice.refer,
                    urgency = %advice.urgency,
                    "referral advice parsed"
                );
                let text = render_advice(&advice);
                let payload = serde_json::to_value(&advice).ok();
                Ok(HandlerResult::with_payload(text, payload))
            }
            Err(_) => Ok(HandlerResult::end(response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_names_specialty_and_urgency() {
        let advice = ReferralAdvice {
            refer: true,
            specialty: "Neurology".into(),
            urgency: "urgent".into(),
            rationale: "Red-flag headache features warrant prompt evaluation.".into(),
        };
        let text = render_advice(&advice);
        assert!(text.contains("an urgent referral to Neurology"));
        assert!(text.contains("Red-flag headache"));
    }

    #[test]
    fn rendering_handles_no_referral() {
        let advice = ReferralAdvice {
            refer: false,
            specialty: String::new(),
            urgency: "none".into(),
            rationale: String::new(),
        };
        assert!(render_advice(&advice).contains("does not look necessary"));
    }
}
