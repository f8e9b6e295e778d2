use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::delivery::{ChatEvent, ChatOutcome, EventSink, emit};
use crate::error::{CareError, Result};
use crate::handler::{
    Handler, HandlerContext, HandlerId, HandlerRegistry, HandlerResult, NextAction, RouteStep,
    StepInput,
};
use crate::store::{SessionStore, Turn};

pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 5;
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Neutral text substituted for a handler segment that failed or timed out.
pub const FALLBACK_SEGMENT: &str =
    "I'm sorry, that part of your question could not be answered right now.";

/// Prepended when any specialist flags a potentially life-threatening
/// finding.
pub const EMERGENCY_GUIDANCE: &str =
    "Important: potentially serious findings were flagged. If this is an emergency, \
     call your local emergency services now.";

const CLARIFY_FALLBACK: &str =
    "Could you tell me a bit more about your health question so I can route it properly?";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on dispatched handler invocations per turn. Guarantees
    /// termination even if delegation hints form a cycle.
    pub max_chain_depth: usize,
    pub handler_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Phases one turn moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    Classifying,
    Dispatching,
    Merging,
    Completed,
    Failed,
}

/// Output of a prior handler, carried into a chained step.
#[derive(Debug, Clone)]
struct CarriedInput {
    text: String,
    payload: Option<Value>,
}

/// A delegation-hint step with its target resolved against the closed
/// handler set.
#[derive(Debug, Clone)]
struct ResolvedStep {
    handler: HandlerId,
    input: StepInput,
    /// Set when the step was spawned by a specific parent segment.
    carried: Option<CarriedInput>,
}

/// The per-turn plan. Recomputed every turn, never persisted.
#[derive(Debug)]
pub struct RoutingDecision {
    steps: VecDeque<ResolvedStep>,
}

impl RoutingDecision {
    /// Strict resolution for root hints: any unknown name is a routing
    /// error.
    fn resolve(steps: &[RouteStep]) -> Result<Self> {
        let mut resolved = VecDeque::with_capacity(steps.len());
        for step in steps {
            let handler = HandlerId::from_name(&step.target)
                .ok_or_else(|| CareError::Routing(format!("unknown handler: {}", step.target)))?;
            resolved.push_back(ResolvedStep {
                handler,
                input: step.input,
                carried: None,
            });
        }
        Ok(Self { steps: resolved })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Lenient resolution for mid-chain hints: unknown names are dropped, the
/// rest of the turn proceeds.
fn resolve_extensions(steps: Vec<RouteStep>, parent: &Segment) -> Vec<ResolvedStep> {
    let mut resolved = Vec::with_capacity(steps.len());
    for step in steps {
        match HandlerId::from_name(&step.target) {
            Some(handler) => {
                let carried = match step.input {
                    StepInput::PriorOutput => Some(CarriedInput {
                        text: parent.text.clone(),
                        payload: parent.payload.clone(),
                    }),
                    StepInput::UserMessage => None,
                };
                resolved.push(ResolvedStep {
                    handler,
                    input: step.input,
                    carried,
                });
            }
            None => {
                warn!(
                    parent = %parent.handler,
                    target = %step.target,
                    "dropping delegation hint to unknown handler"
                );
            }
        }
    }
    resolved
}

/// One handler's contribution to the turn.
#[derive(Debug, Clone)]
struct Segment {
    handler: HandlerId,
    text: String,
    payload: Option<Value>,
    degraded: bool,
    error: Option<String>,
}

impl Segment {
    fn from_result(handler: HandlerId, result: &HandlerResult) -> Self {
        Self {
            handler,
            text: result.text.clone(),
            payload: result.payload.clone(),
            degraded: false,
            error: None,
        }
    }

    fn fallback(handler: HandlerId, error: &CareError) -> Self {
        Self {
            handler,
            text: FALLBACK_SEGMENT.to_string(),
            payload: None,
            degraded: true,
            error: Some(error.to_string()),
        }
    }

    fn flags_emergency(&self) -> bool {
        self.payload
            .as_ref()
            .and_then(|p| p.get("emergency"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Routes each inbound message through the handler set and merges the
/// results into one reply.
///
/// One code path serves both delivery modes; attaching an event sink is
/// the only difference between them.
pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn SessionStore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<HandlerRegistry>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_config(registry, store, OrchestratorConfig::default())
    }

    pub fn with_config(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Blocking delivery: run the turn to completion, return the merged
    /// reply.
    pub async fn chat(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<ChatOutcome> {
        let result = self.run_turn(user_id, session_id, message, None).await;
        if let Err(err) = &result {
            self.enter(TurnPhase::Failed, user_id, session_id);
            warn!(%user_id, %session_id, error = %err, "turn failed");
        }
        result
    }

    /// Streaming delivery: same machine, progress observed as events. Ends
    /// with exactly one `Complete` or `Error`.
    pub async fn chat_streaming(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        sink: EventSink,
    ) {
        match self.run_turn(user_id, session_id, message, Some(&sink)).await {
            Ok(outcome) => {
                let _ = sink
                    .send(ChatEvent::Complete {
                        content: outcome.response_text,
                        metadata: outcome.metadata,
                    })
                    .await;
            }
            Err(err) => {
                self.enter(TurnPhase::Failed, user_id, session_id);
                warn!(%user_id, %session_id, error = %err, "turn failed");
                let _ = sink
                    .send(ChatEvent::Error {
                        kind: err.kind().to_string(),
                        content: err.to_string(),
                    })
                    .await;
            }
        }
    }

    fn enter(&self, phase: TurnPhase, user_id: &str, session_id: &str) {
        debug!(%user_id, %session_id, phase = ?phase, "phase transition");
    }

    async fn run_turn(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        sink: Option<&EventSink>,
    ) -> Result<ChatOutcome> {
        if message.trim().is_empty() {
            return Err(CareError::Validation("message must not be empty".into()));
        }

        self.enter(TurnPhase::Received, user_id, session_id);
        let history = self.store.get_history(user_id, session_id).await?;

        self.enter(TurnPhase::Classifying, user_id, session_id);
        let root = self.registry.root();
        emit(
            sink,
            ChatEvent::Thinking {
                author: root.id().as_str().to_string(),
            },
        )
        .await;
        let root_result = self
            .invoke_with_timeout(root.as_ref(), session_id, &history, message, None)
            .await
            .map_err(|e| CareError::Routing(format!("classification failed: {e}")))?;

        let decision = match root_result.next {
            NextAction::End => None,
            NextAction::Delegate(ref steps) => {
                let decision = RoutingDecision::resolve(steps)?;
                if decision.is_empty() { None } else { Some(decision) }
            }
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut truncated = false;

        match decision {
            None => {
                // The root delegated to nobody: its clarifying text is the
                // whole reply.
                let text = if root_result.text.trim().is_empty() {
                    CLARIFY_FALLBACK.to_string()
                } else {
                    root_result.text.clone()
                };
                emit(
                    sink,
                    ChatEvent::Response {
                        author: HandlerId::Triage.as_str().to_string(),
                        content: text.clone(),
                    },
                )
                .await;
                segments.push(Segment {
                    handler: HandlerId::Triage,
                    text,
                    payload: None,
                    degraded: false,
                    error: None,
                });
            }
            Some(decision) => {
                self.enter(TurnPhase::Dispatching, user_id, session_id);
                truncated = self
                    .dispatch(
                        decision,
                        session_id,
                        &history,
                        message,
                        sink,
                        &mut segments,
                    )
                    .await;
            }
        }

        self.enter(TurnPhase::Merging, user_id, session_id);
        let (response_text, metadata) = merge(&segments, truncated);

        self.enter(TurnPhase::Completed, user_id, session_id);
        let turns = build_turns(message, &segments, &response_text);
        self.store.append_turns(user_id, session_id, turns).await?;

        info!(
            %user_id,
            %session_id,
            handlers = segments.len(),
            truncated,
            "turn completed"
        );
        Ok(ChatOutcome {
            response_text,
            metadata,
        })
    }

    /// Work the decision queue. Consecutive steps fed by the raw message
    /// run concurrently; their results merge in decision order. Chained
    /// steps run sequentially on their parent's output. Returns whether
    /// the chain was cut by the depth bound.
    async fn dispatch(
        &self,
        decision: RoutingDecision,
        session_id: &str,
        history: &[Turn],
        message: &str,
        sink: Option<&EventSink>,
        segments: &mut Vec<Segment>,
    ) -> bool {
        let mut queue = decision.steps;
        let mut dispatched = 0usize;

        while !queue.is_empty() {
            let budget = self.config.max_chain_depth.saturating_sub(dispatched);
            if budget == 0 {
                warn!(
                    session_id,
                    pending = queue.len(),
                    "chain depth bound reached, truncating"
                );
                return true;
            }

            // Gather the run of independent message-fed steps at the front.
            let mut batch = Vec::new();
            while batch.len() < budget {
                let independent = matches!(
                    queue.front(),
                    Some(step) if step.input == StepInput::UserMessage && step.carried.is_none()
                );
                if !independent {
                    break;
                }
                if let Some(step) = queue.pop_front() {
                    batch.push(step);
                }
            }

            if !batch.is_empty() {
                for step in &batch {
                    emit(
                        sink,
                        ChatEvent::Thinking {
                            author: step.handler.as_str().to_string(),
                        },
                    )
                    .await;
                }
                let invocations = batch.iter().map(|step| {
                    self.dispatch_one(step.handler, session_id, history, message, None)
                });
                let outcomes = join_all(invocations).await;
                dispatched += batch.len();
                let mut extensions = Vec::new();
                for (segment, extension) in outcomes {
                    emit(
                        sink,
                        ChatEvent::Response {
                            author: segment.handler.as_str().to_string(),
                            content: segment.text.clone(),
                        },
                    )
                    .await;
                    segments.push(segment);
                    extensions.extend(extension);
                }
                // Extensions continue the chain ahead of anything the root
                // queued later.
                for step in extensions.into_iter().rev() {
                    queue.push_front(step);
                }
                continue;
            }

            // A chained step: feed it the parent output, falling back to
            // the latest segment when the dependency came straight from the
            // root decision.
            let Some(step) = queue.pop_front() else {
                break;
            };
            let carried = step.carried.clone().or_else(|| {
                segments.last().map(|segment| CarriedInput {
                    text: segment.text.clone(),
                    payload: segment.payload.clone(),
                })
            });
            let (input_text, carried_payload) = match &carried {
                Some(c) => (c.text.as_str(), c.payload.as_ref()),
                None => (message, None),
            };

            emit(
                sink,
                ChatEvent::Thinking {
                    author: step.handler.as_str().to_string(),
                },
            )
            .await;
            let (segment, extension) = self
                .dispatch_one(step.handler, session_id, history, input_text, carried_payload)
                .await;
            dispatched += 1;
            emit(
                sink,
                ChatEvent::Response {
                    author: segment.handler.as_str().to_string(),
                    content: segment.text.clone(),
                },
            )
            .await;
            segments.push(segment);
            for step in extension.into_iter().rev() {
                queue.push_front(step);
            }
        }
        false
    }

    /// Invoke one handler, degrading its segment to fallback text on any
    /// failure. Never aborts the turn.
    async fn dispatch_one(
        &self,
        id: HandlerId,
        session_id: &str,
        history: &[Turn],
        input: &str,
        carried: Option<&Value>,
    ) -> (Segment, Vec<ResolvedStep>) {
        let Some(handler) = self.registry.get(id) else {
            let err = CareError::HandlerFailure {
                handler: id.to_string(),
                message: "not registered".into(),
            };
            warn!(handler = %id, "routed handler is not registered");
            return (Segment::fallback(id, &err), Vec::new());
        };

        match self
            .invoke_with_timeout(handler.as_ref(), session_id, history, input, carried)
            .await
        {
            Ok(result) => {
                let segment = Segment::from_result(id, &result);
                let extensions = match result.next {
                    NextAction::Delegate(steps) => resolve_extensions(steps, &segment),
                    NextAction::End => Vec::new(),
                };
                (segment, extensions)
            }
            Err(err) => {
                warn!(handler = %id, error = %err, "handler failed, substituting fallback");
                (Segment::fallback(id, &err), Vec::new())
            }
        }
    }

    async fn invoke_with_timeout(
        &self,
        handler: &dyn Handler,
        session_id: &str,
        history: &[Turn],
        input: &str,
        carried: Option<&Value>,
    ) -> Result<HandlerResult> {
        let ctx = HandlerContext {
            session_id,
            history,
            input,
            carried,
        };
        match tokio::time::timeout(self.config.handler_timeout, handler.invoke(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(CareError::HandlerFailure {
                handler: handler.id().to_string(),
                message: format!("timed out after {:?}", self.config.handler_timeout),
            }),
        }
    }
}

/// Compose the reply and its metadata from the gathered segments, in
/// invocation order.
fn merge(segments: &[Segment], truncated: bool) -> (String, Value) {
    let emergency = segments.iter().any(Segment::flags_emergency);

    let mut parts: Vec<&str> = Vec::new();
    if emergency {
        parts.push(EMERGENCY_GUIDANCE);
    }
    parts.extend(
        segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.trim().is_empty()),
    );
    let response_text = if parts.is_empty() {
        FALLBACK_SEGMENT.to_string()
    } else {
        parts.join("\n\n")
    };

    let mut what_was_called = Map::new();
    let mut errors = Map::new();
    let mut document = None;
    for segment in segments {
        let status = if segment.degraded { "failed" } else { "success" };
        what_was_called.insert(segment.handler.as_str().to_string(), json!(status));
        if let Some(error) = &segment.error {
            errors.insert(segment.handler.as_str().to_string(), json!(error));
        }
        if segment.handler == HandlerId::Documentation && !segment.degraded {
            document = segment.payload.clone();
        }
    }

    let mut metadata = Map::new();
    metadata.insert(
        "acm".to_string(),
        json!({ "what_was_called": what_was_called, "errors": errors }),
    );
    metadata.insert("truncated".to_string(), json!(truncated));
    metadata.insert("emergency".to_string(), json!(emergency));
    if let Some(document) = document {
        metadata.insert("document".to_string(), document);
    }
    (response_text, Value::Object(metadata))
}

/// Turns appended at completion: the user message, one internal turn per
/// healthy specialist segment, then exactly one assistant turn.
fn build_turns(message: &str, segments: &[Segment], response_text: &str) -> Vec<Turn> {
    let mut turns = vec![Turn::user(message)];
    for segment in segments {
        let internal = !matches!(
            segment.handler,
            HandlerId::Triage | HandlerId::Documentation
        );
        if internal && !segment.degraded {
            turns.push(Turn::handler_internal(
                segment.handler.as_str(),
                segment.text.clone(),
                segment.payload.clone(),
            ));
        }
    }
    let author = segments
        .first()
        .map(|segment| segment.handler.as_str().to_string());
    turns.push(Turn::assistant(response_text, author));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemorySessionStore, TurnRole};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Root stub delegating to a fixed list of targets.
    struct StubRoot {
        targets: Vec<&'static str>,
    }

    #[async_trait]
    impl Handler for StubRoot {
        fn id(&self) -> HandlerId {
            HandlerId::Triage
        }

        async fn invoke(&self, _ctx: HandlerContext<'_>) -> Result<HandlerResult> {
            if self.targets.is_empty() {
                return Ok(HandlerResult::end("Tell me more."));
            }
            Ok(HandlerResult::delegate(
                "",
                self.targets.iter().map(|t| RouteStep::message(*t)).collect(),
            ))
        }
    }

    /// Specialist stub echoing a fixed reply.
    struct StubSpecialist {
        id: HandlerId,
        reply: &'static str,
    }

    #[async_trait]
    impl Handler for StubSpecialist {
        fn id(&self) -> HandlerId {
            self.id
        }

        async fn invoke(&self, _ctx: HandlerContext<'_>) -> Result<HandlerResult> {
            Ok(HandlerResult::end(self.reply))
        }
    }

    /// Specialist stub that always delegates to itself.
    struct SelfDelegating {
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for SelfDelegating {
        fn id(&self) -> HandlerId {
            HandlerId::SymptomAnalysis
        }

        async fn invoke(&self, _ctx: HandlerContext<'_>) -> Result<HandlerResult> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult {
                text: "looping".into(),
                payload: None,
                next: NextAction::Delegate(vec![RouteStep::chained("symptom_analysis")]),
            })
        }
    }

    struct FailingSpecialist;

    #[async_trait]
    impl Handler for FailingSpecialist {
        fn id(&self) -> HandlerId {
            HandlerId::LabResults
        }

        async fn invoke(&self, _ctx: HandlerContext<'_>) -> Result<HandlerResult> {
            Err(CareError::HandlerFailure {
                handler: "lab_results".into(),
                message: "backend down".into(),
            })
        }
    }

    async fn seeded_store() -> (Arc<InMemorySessionStore>, String, String) {
        let store = Arc::new(InMemorySessionStore::new());
        let (user, session) = store.create_session(None, None).await.unwrap();
        (store, user, session)
    }

    fn orchestrator(
        registry: HandlerRegistry,
        store: Arc<InMemorySessionStore>,
    ) -> Orchestrator {
        Orchestrator::new(Arc::new(registry), store)
    }

    #[tokio::test]
    async fn chat_against_missing_session_is_not_found_with_no_side_effects() {
        let (store, user, session) = seeded_store().await;
        let registry =
            HandlerRegistry::builder(Arc::new(StubRoot { targets: vec![] })).build();
        let orchestrator = orchestrator(registry, store.clone());

        let err = orchestrator
            .chat(&user, "missing", "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(store.get_history(&user, &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delegated_turn_merges_in_invocation_order_and_appends_once() {
        let (store, user, session) = seeded_store().await;
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["symptom_analysis", "lifestyle"],
        }))
        .register(Arc::new(StubSpecialist {
            id: HandlerId::SymptomAnalysis,
            reply: "symptom view",
        }))
        .register(Arc::new(StubSpecialist {
            id: HandlerId::Lifestyle,
            reply: "lifestyle view",
        }))
        .build();
        let orchestrator = orchestrator(registry, store.clone());

        let outcome = orchestrator
            .chat(&user, &session, "I have a headache and poor sleep")
            .await
            .unwrap();
        assert_eq!(outcome.response_text, "symptom view\n\nlifestyle view");

        let history = store.get_history(&user, &session).await.unwrap();
        let assistants: Vec<_> = history
            .iter()
            .filter(|t| t.role == TurnRole::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(
            history[1].author.as_deref(),
            Some("symptom_analysis"),
            "internal turns keep invocation order"
        );
    }

    #[tokio::test]
    async fn unknown_root_target_is_routing_error_and_history_is_unchanged() {
        let (store, user, session) = seeded_store().await;
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["imaging"],
        }))
        .build();
        let orchestrator = orchestrator(registry, store.clone());

        let err = orchestrator.chat(&user, &session, "scan me").await.unwrap_err();
        assert_eq!(err.kind(), "routing_error");
        assert!(store.get_history(&user, &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_delegation_terminates_within_bound_and_flags_truncation() {
        let (store, user, session) = seeded_store().await;
        let invocations = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["symptom_analysis"],
        }))
        .register(Arc::new(SelfDelegating {
            invocations: invocations.clone(),
        }))
        .build();
        let orchestrator = orchestrator(registry, store);

        let outcome = orchestrator.chat(&user, &session, "loop").await.unwrap();
        assert!(invocations.load(Ordering::SeqCst) <= DEFAULT_MAX_CHAIN_DEPTH + 1);
        assert_eq!(outcome.metadata["truncated"], json!(true));
    }

    #[tokio::test]
    async fn failing_handler_degrades_to_fallback_segment() {
        let (store, user, session) = seeded_store().await;
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["lab_results", "lifestyle"],
        }))
        .register(Arc::new(FailingSpecialist))
        .register(Arc::new(StubSpecialist {
            id: HandlerId::Lifestyle,
            reply: "lifestyle view",
        }))
        .build();
        let orchestrator = orchestrator(registry, store);

        let outcome = orchestrator.chat(&user, &session, "labs?").await.unwrap();
        assert!(outcome.response_text.contains(FALLBACK_SEGMENT));
        assert!(outcome.response_text.contains("lifestyle view"));
        assert_eq!(
            outcome.metadata["acm"]["what_was_called"]["lab_results"],
            json!("failed")
        );
        assert_eq!(
            outcome.metadata["acm"]["what_was_called"]["lifestyle"],
            json!("success")
        );
    }

    #[tokio::test]
    async fn emergency_payload_prepends_guidance() {
        struct EmergencySpecialist;

        #[async_trait]
        impl Handler for EmergencySpecialist {
            fn id(&self) -> HandlerId {
                HandlerId::SymptomAnalysis
            }

            async fn invoke(&self, _ctx: HandlerContext<'_>) -> Result<HandlerResult> {
                Ok(HandlerResult::with_payload(
                    "chest pain assessment",
                    Some(json!({"emergency": true})),
                ))
            }
        }

        let (store, user, session) = seeded_store().await;
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["symptom_analysis"],
        }))
        .register(Arc::new(EmergencySpecialist))
        .build();
        let orchestrator = orchestrator(registry, store);

        let outcome = orchestrator
            .chat(&user, &session, "crushing chest pain")
            .await
            .unwrap();
        assert!(outcome.response_text.starts_with(EMERGENCY_GUIDANCE));
        assert_eq!(outcome.metadata["emergency"], json!(true));
    }

    #[tokio::test]
    async fn streaming_and_blocking_produce_the_same_reply() {
        let (store, user, blocking_session) = seeded_store().await;
        let (_, streaming_session) = store
            .create_session(Some(user.clone()), None)
            .await
            .unwrap();
        let registry = HandlerRegistry::builder(Arc::new(StubRoot {
            targets: vec!["symptom_analysis", "lifestyle"],
        }))
        .register(Arc::new(StubSpecialist {
            id: HandlerId::SymptomAnalysis,
            reply: "symptom view",
        }))
        .register(Arc::new(StubSpecialist {
            id: HandlerId::Lifestyle,
            reply: "lifestyle view",
        }))
        .build();
        let orchestrator = orchestrator(registry, store);

        let blocking = orchestrator
            .chat(&user, &blocking_session, "same message")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        orchestrator
            .chat_streaming(&user, &streaming_session, "same message", tx)
            .await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let final_text = events
            .iter()
            .find_map(|event| match event {
                ChatEvent::Complete { content, .. } => Some(content.clone()),
                _ => None,
            })
            .expect("terminal complete event");
        assert_eq!(final_text, blocking.response_text);

        let terminals = events
            .iter()
            .filter(|event| {
                matches!(event, ChatEvent::Complete { .. } | ChatEvent::Error { .. })
            })
            .count();
        assert_eq!(terminals, 1);

        // Thinking events precede their matching responses, in invocation
        // order.
        let authors: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Thinking { author } => Some(author.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(authors, vec!["triage", "symptom_analysis", "lifestyle"]);
    }

    #[tokio::test]
    async fn empty_message_is_a_validation_error() {
        let (store, user, session) = seeded_store().await;
        let registry =
            HandlerRegistry::builder(Arc::new(StubRoot { targets: vec![] })).build();
        let orchestrator = orchestrator(registry, store);
        let err = orchestrator.chat(&user, &session, "   ").await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
