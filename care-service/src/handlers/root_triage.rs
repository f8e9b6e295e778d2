use std::sync::Arc;

use async_trait::async_trait;
use care_flow::{
    DocumentationPolicy, Handler, HandlerContext, HandlerId, HandlerResult, Result, RouteStep,
    TextGenerator,
};
use tracing::{info, warn};

use super::types::TriagePlan;

pub const TRIAGE_PROMPT: &str = r#"You are the coordinating triage layer of a virtual primary care assistant.
Your ONLY job is to decide which specialist handlers should answer the user's latest message.
You never answer health questions yourself.

Available handlers:
- "symptom_analysis": free-text symptom descriptions, differential reasoning
- "lab_results": lab values or test results mentioned in the message
- "medication_interactions": medication lists, drug questions, interactions
- "lifestyle": sleep, diet, exercise, smoking, alcohol, stress
- "specialist_referral": explicit requests for a referral or a specialist

IF ONE OR MORE HANDLERS APPLY, respond with ONLY this JSON:
{
  "handlers": ["symptom_analysis", "lifestyle"]
}

IF NONE APPLY (greetings, small talk, unclear requests), respond with a short
clarifying question in plain text instead.
Do not mix text and JSON in your response."#;

fn parse_triage_plan(response: &str) -> Option<TriagePlan> {
    serde_json::from_str::<TriagePlan>(response.trim()).ok()
}

/// Deterministic keyword routing used when the generation backend is
/// unreachable. Coarse on purpose; the turn must still complete.
fn keyword_triage(message: &str) -> Vec<RouteStep> {
    const SYMPTOM: &[&str] = &[
        "symptom", "pain", "ache", "fever", "cough", "headache", "hurt", "dizzy", "nausea",
        "rash", "tired",
    ];
    const LABS: &[&str] = &["lab", "test result", "blood work", "cholesterol", "a1c"];
    const MEDS: &[&str] = &[
        "medication",
        "medicine",
        "drug",
        "pill",
        "prescription",
        "ibuprofen",
        "taking",
    ];
    const LIFESTYLE: &[&str] = &[
        "diet", "sleep", "exercise", "smoking", "alcohol", "weight", "stress",
    ];
    const REFERRAL: &[&str] = &["specialist", "referral", "refer me"];

    let lower = message.to_lowercase();
    let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let mut steps = Vec::new();
    if hit(SYMPTOM) {
        steps.push(RouteStep::message("symptom_analysis"));
    }
    if hit(LABS) {
        steps.push(RouteStep::message("lab_results"));
    }
    if hit(MEDS) {
        steps.push(RouteStep::message("medication_interactions"));
    }
    if hit(LIFESTYLE) {
        steps.push(RouteStep::message("lifestyle"));
    }
    if hit(REFERRAL) {
        steps.push(RouteStep::message("specialist_referral"));
    }
    if steps.is_empty() {
        // A health query we cannot place still deserves an answer.
        steps.push(RouteStep::message("symptom_analysis"));
    }
    steps
}

/// The classifying and delegating root. Checks the documentation policy
/// first, then asks the model for a routing plan.
pub struct RootTriageHandler {
    generator: Arc<dyn TextGenerator>,
    policy: DocumentationPolicy,
}

impl RootTriageHandler {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: DocumentationPolicy) -> Self {
        Self { generator, policy }
    }
}

#[async_trait]
impl Handler for RootTriageHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Triage
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        if self.policy.should_document(ctx.input) {
            info!(session_id = ctx.session_id, "documentation trigger received");
            return Ok(HandlerResult::delegate(
                "",
                vec![RouteStep::message("documentation")],
            ));
        }

        match self
            .generator
            .generate(TRIAGE_PROMPT, ctx.history, ctx.input)
            .await
        {
            Ok(response) => {
                if let Some(plan) = parse_triage_plan(&response) {
                    info!(
                        session_id = ctx.session_id,
                        handlers = ?plan.handlers,
                        "triage plan determined"
                    );
                    Ok(HandlerResult::delegate(
                        "",
                        plan.handlers.into_iter().map(RouteStep::message).collect(),
                    ))
                } else {
                    // Not a plan: the model asked a clarifying question.
                    Ok(HandlerResult::end(response))
                }
            }
            Err(err) => {
                warn!(
                    session_id = ctx.session_id,
                    error = %err,
                    "generation unavailable, using keyword triage"
                );
                Ok(HandlerResult::delegate("", keyword_triage(ctx.input)))
            }
        }
    }
}
