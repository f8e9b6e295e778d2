pub mod delivery;
pub mod document;
pub mod error;
pub mod generation;
pub mod handler;
pub mod router;
pub mod store;

// Re-export commonly used types
pub use delivery::{ChatEvent, ChatOutcome, EventSink};
pub use document::{
    ClinicalDocument, DOCUMENT_COLLECTION, DocumentStore, DocumentationPipeline,
    DocumentationPolicy, InMemoryDocumentStore, contains_identifiers, deidentify,
};
pub use error::{CareError, GenerationError, Result};
pub use generation::TextGenerator;
pub use handler::{
    Handler, HandlerContext, HandlerId, HandlerRegistry, HandlerRegistryBuilder, HandlerResult,
    NextAction, RouteStep, StepInput,
};
pub use router::{
    EMERGENCY_GUIDANCE, FALLBACK_SEGMENT, Orchestrator, OrchestratorConfig, RoutingDecision,
    TurnPhase,
};
pub use store::{InMemorySessionStore, Session, SessionStore, Turn, TurnRole};
