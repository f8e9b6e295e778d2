use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::Turn;

/// The closed set of handler identities. Adding one is a compile-time
/// registry change, not runtime registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerId {
    /// The classifying and delegating root. Never answers domain questions.
    Triage,
    SymptomAnalysis,
    LabResults,
    MedicationInteractions,
    Lifestyle,
    SpecialistReferral,
    Documentation,
}

impl HandlerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerId::Triage => "triage",
            HandlerId::SymptomAnalysis => "symptom_analysis",
            HandlerId::LabResults => "lab_results",
            HandlerId::MedicationInteractions => "medication_interactions",
            HandlerId::Lifestyle => "lifestyle",
            HandlerId::SpecialistReferral => "specialist_referral",
            HandlerId::Documentation => "documentation",
        }
    }

    /// Resolve a delegation-hint name. `None` means the name is unknown to
    /// the registry set; what that implies is the caller's decision.
    pub fn from_name(name: &str) -> Option<HandlerId> {
        match name {
            "triage" => Some(HandlerId::Triage),
            "symptom_analysis" => Some(HandlerId::SymptomAnalysis),
            "lab_results" => Some(HandlerId::LabResults),
            "medication_interactions" => Some(HandlerId::MedicationInteractions),
            "lifestyle" => Some(HandlerId::Lifestyle),
            "specialist_referral" => Some(HandlerId::SpecialistReferral),
            "documentation" => Some(HandlerId::Documentation),
            _ => None,
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What feeds a routed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInput {
    /// The raw user message.
    UserMessage,
    /// The output of the prior handler in the same decision.
    PriorOutput,
}

/// One entry in a delegation hint. Targets are raw names; resolution to a
/// `HandlerId` happens in the orchestrator.
#[derive(Debug, Clone)]
pub struct RouteStep {
    pub target: String,
    pub input: StepInput,
}

impl RouteStep {
    /// A step fed by the raw user message.
    pub fn message(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            input: StepInput::UserMessage,
        }
    }

    /// A step fed by the hinting handler's own output.
    pub fn chained(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            input: StepInput::PriorOutput,
        }
    }
}

/// What should happen after a handler completes.
#[derive(Debug, Clone)]
pub enum NextAction {
    /// Invoke these handlers next, in order.
    Delegate(Vec<RouteStep>),
    /// Nothing further.
    End,
}

/// Output of one handler invocation. Consumed by the orchestrator within
/// the current routing decision; only the merged display text outlives it.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    /// Display text for this segment of the reply.
    pub text: String,
    /// Structured side data (interaction tables, note drafts, ...).
    pub payload: Option<Value>,
    pub next: NextAction,
}

impl HandlerResult {
    pub fn end(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: None,
            next: NextAction::End,
        }
    }

    pub fn with_payload(text: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            text: text.into(),
            payload,
            next: NextAction::End,
        }
    }

    pub fn delegate(text: impl Into<String>, steps: Vec<RouteStep>) -> Self {
        Self {
            text: text.into(),
            payload: None,
            next: NextAction::Delegate(steps),
        }
    }
}

/// Everything a handler may look at. Handlers are stateless between
/// invocations; all state arrives here.
pub struct HandlerContext<'a> {
    pub session_id: &'a str,
    /// Conversation history in insertion order.
    pub history: &'a [Turn],
    /// Input text for this invocation: the user message, or a prior
    /// handler's output when chained.
    pub input: &'a str,
    /// Structured payload carried over from the prior handler in a chain.
    pub carried: Option<&'a Value>,
}

/// Core capability every handler implements.
#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult>;
}

/// Fixed name-to-implementation mapping, built once at process start.
pub struct HandlerRegistry {
    root: Arc<dyn Handler>,
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// The root handler is required up front; everything else registers on
    /// the builder.
    pub fn builder(root: Arc<dyn Handler>) -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            root,
            handlers: HashMap::new(),
        }
    }

    pub fn root(&self) -> Arc<dyn Handler> {
        self.root.clone()
    }

    pub fn get(&self, id: HandlerId) -> Option<Arc<dyn Handler>> {
        if id == self.root.id() {
            return Some(self.root.clone());
        }
        self.handlers.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub struct HandlerRegistryBuilder {
    root: Arc<dyn Handler>,
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    pub fn register(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(handler.id(), handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            root: self.root,
            handlers: self.handlers,
        }
    }
}
