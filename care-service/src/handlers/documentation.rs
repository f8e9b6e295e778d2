use async_trait::async_trait;
use care_flow::{
    DOCUMENT_COLLECTION, DocumentationPipeline, Handler, HandlerContext, HandlerId, HandlerResult,
    Result,
};
use serde_json::json;
use tracing::info;

/// Terminal handler storing the encounter as a de-identified clinical
/// note. Persistence failure propagates as a pipeline error; the
/// orchestrator degrades the segment without failing the turn.
pub struct DocumentationHandler {
    pipeline: DocumentationPipeline,
}

impl DocumentationHandler {
    pub fn new(pipeline: DocumentationPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Handler for DocumentationHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Documentation
    }

    async fn invoke(&self, ctx: HandlerContext<'_>) -> Result<HandlerResult> {
        let document = self.pipeline.run(ctx.session_id, ctx.history).await?;
        info!(
            session_id = ctx.session_id,
            document_id = %document.id,
            "encounter note stored"
        );

        let confirmation = format!(
            "Your visit summary has been written up and stored. Reference: {}.",
            document.id
        );
        let payload = json!({
            "document_id": document.id,
            "collection": DOCUMENT_COLLECTION,
            "created_at": document.created_at,
        });
        Ok(HandlerResult::with_payload(confirmation, Some(payload)))
    }
}
