use std::time::Duration;

use care_flow::router::DEFAULT_MAX_CHAIN_DEPTH;

/// Configuration for the assistant service, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub generation_model: String,
    pub handler_timeout: Duration,
    pub max_chain_depth: usize,
    pub doc_trigger_command: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("PORT", defaults.port),
            generation_model: std::env::var("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            handler_timeout: Duration::from_secs(env_parsed(
                "HANDLER_TIMEOUT_SECS",
                defaults.handler_timeout.as_secs(),
            )),
            max_chain_depth: env_parsed("MAX_CHAIN_DEPTH", defaults.max_chain_depth),
            doc_trigger_command: std::env::var("DOC_TRIGGER_COMMAND")
                .unwrap_or(defaults.doc_trigger_command),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            generation_model: "openai/gpt-4o-mini".to_string(),
            handler_timeout: Duration::from_secs(30),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            doc_trigger_command: "DONE".to_string(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_chain_depth, DEFAULT_MAX_CHAIN_DEPTH);
        assert_eq!(config.doc_trigger_command, "DONE");
    }
}
