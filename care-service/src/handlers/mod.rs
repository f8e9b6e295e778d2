// Concrete handlers behind the orchestration core
pub mod documentation;
pub mod lab_results;
pub mod lifestyle;
pub mod medication_interactions;
pub mod root_triage;
pub mod specialist_referral;
pub mod symptom_analysis;

// Shared modules
pub mod types;
pub mod utils;

// Re-export handler implementations
pub use documentation::DocumentationHandler;
pub use lab_results::LabResultsHandler;
pub use lifestyle::LifestyleHandler;
pub use medication_interactions::MedicationInteractionsHandler;
pub use root_triage::{RootTriageHandler, TRIAGE_PROMPT};
pub use specialist_referral::SpecialistReferralHandler;
pub use symptom_analysis::SymptomAnalysisHandler;
pub use utils::OpenRouterGenerator;

use std::sync::Arc;

use care_flow::{
    DocumentStore, DocumentationPipeline, DocumentationPolicy, HandlerRegistry, TextGenerator,
};

/// Wire the fixed handler set. The registry never changes after this.
pub fn build_registry(
    generator: Arc<dyn TextGenerator>,
    documents: Arc<dyn DocumentStore>,
    policy: DocumentationPolicy,
) -> HandlerRegistry {
    HandlerRegistry::builder(Arc::new(RootTriageHandler::new(generator.clone(), policy)))
        .register(Arc::new(SymptomAnalysisHandler::new(generator.clone())))
        .register(Arc::new(LabResultsHandler::new(generator.clone())))
        .register(Arc::new(MedicationInteractionsHandler::new(
            generator.clone(),
        )))
        .register(Arc::new(LifestyleHandler::new(generator.clone())))
        .register(Arc::new(SpecialistReferralHandler::new(generator)))
        .register(Arc::new(DocumentationHandler::new(
            DocumentationPipeline::new(documents),
        )))
        .build()
}
