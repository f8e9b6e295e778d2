use async_trait::async_trait;
use care_flow::{GenerationError, TextGenerator, Turn, TurnRole};
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::openrouter;

/// Convert conversation turns to rig messages. Internal handler turns stay
/// out of the model-visible transcript.
pub fn to_rig_messages(history: &[Turn]) -> Vec<Message> {
    history
        .iter()
        .filter_map(|turn| match turn.role {
            TurnRole::User => Some(Message::user(turn.content.clone())),
            TurnRole::Assistant => Some(Message::assistant(turn.content.clone())),
            TurnRole::HandlerInternal => None,
        })
        .collect()
}

/// `TextGenerator` over the OpenRouter provider.
pub struct OpenRouterGenerator {
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn from_env(model: impl Into<String>) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
        Ok(Self {
            api_key,
            model: model.into(),
        })
    }

    fn agent(&self, preamble: &str) -> Agent<openrouter::CompletionModel> {
        let client = openrouter::Client::new(&self.api_key);
        client.agent(&self.model).preamble(preamble).build()
    }
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
    async fn generate(
        &self,
        prompt: &str,
        history: &[Turn],
        input: &str,
    ) -> Result<String, GenerationError> {
        let agent = self.agent(prompt);
        let chat_history = to_rig_messages(history);
        agent
            .chat(input, chat_history)
            .await
            .map_err(map_provider_error)
    }
}

fn map_provider_error(err: impl std::fmt::Display) -> GenerationError {
    let text = err.to_string();
    if text.contains("429") || text.to_lowercase().contains("rate limit") {
        GenerationError::RateLimited
    } else {
        GenerationError::Unavailable(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_turns_are_filtered_from_model_history() {
        let history = vec![
            Turn::user("hello"),
            Turn::handler_internal("symptom_analysis", "notes", None),
            Turn::assistant("hi there", None),
        ];
        assert_eq!(to_rig_messages(&history).len(), 2);
    }

    #[test]
    fn rate_limit_errors_are_classified() {
        assert!(matches!(
            map_provider_error("HTTP 429 too many requests"),
            GenerationError::RateLimited
        ));
        assert!(matches!(
            map_provider_error("connection refused"),
            GenerationError::Unavailable(_)
        ));
    }
}
