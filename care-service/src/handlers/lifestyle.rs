use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{Handler, HandlerContext, HandlerId, HandlerResult, Result, TextGenerator};
use tracing::info;

use super::types::LifestylePlan;

pub const LIFESTYLE_PROMPT: &str = r#"You are a lifestyle and prevention specialist.
Input: lifestyle details mentioned by the user (sleep, activity, diet, smoking, alcohol, stress).
1) Produce personalized short-term (7-30 days) and long-term (3-12 months) recommendations.
2) Phrase goals SMART-style: specific, measurable, achievable, relevant, time-bound.
3) If the user appears to be under 18 or pregnant, note that specialized guidance is needed.

Respond with ONLY this JSON:
{
  "short_term_goals": ["..."],
  "long_term_goals": ["..."],
  "rationale": "..."
}

Do not mix text and JSON in your response."#;

fn render_plan(plan: &LifestylePlan) -> String {
    let mut lines = Vec::new();
    if !plan.short_term_goals.is_empty() {
        lines.push("Over the next few weeks:".to_string());
        for goal in &plan.short_term_goals {
            lines.push(format!("- {goal}"));
        }
    }
    if !plan.long_term_goals.is_empty() {
        lines.push("Over the coming months:".to_string());
        for goal in &plan.long_term_goals {
            lines.push(format!("- {goal}"));
        }
    }
    if !plan.rationale.is_empty() {
        lines.push(plan.rationale.clone());
    }
    lines.join("\n")
}

/// Specialist producing prevention and habit recommendations.
pub struct LifestyleHandler {
    generator: Arc<dyn TextGenerator>,
}

impl LifestyleHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for LifestyleHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Lifestyle
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let response = self
            .generator
            .generate(LIFESTYLE_PROMPT, ctx.history, ctx.input)
            .await?;

        match serde_json::from_str::<LifestylePlan>(response.trim()) {
            Ok(plan) => {
                info!(
                    session_id = ctx.session_id,
                    short_term = plan.short_term_goals.len(),
                    long_term = plan.long_term_goals.len(),
                    "lifestyle plan parsed"
                );
                let text = render_plan(&plan);
                let payload = serde_json::to_value(&plan).ok();
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
    fn rendering_groups_goals_by_horizon() {
        let plan = LifestylePlan {
            short_term_goals: vec!["walk 20 minutes daily".into()],
            long_term_goals: vec!["reach 7 hours of sleep per night".into()],
            rationale: "Gradual changes hold better.".into(),
        };
        let text = render_plan(&plan);
        assert!(text.contains("next few weeks"));
        assert!(text.contains("walk 20 minutes daily"));
        assert!(text.contains("coming months"));
        assert!(text.ends_with("Gradual changes hold better."));
    }
}
