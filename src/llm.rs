//! Language model seam used for categorization and summary highlights

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::Result;

/// A chat-style completion backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs
    fn name(&self) -> &str;

    /// Complete `prompt` under the given system instructions
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[cfg(feature = "ml")]
pub use openai::OpenAiModel;

#[cfg(feature = "ml")]
mod openai {
    use async_openai::{
        config::OpenAIConfig,
        types::{
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            CreateChatCompletionRequestArgs,
        },
        Client,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    use super::LanguageModel;
    use crate::config::LlmConfig;
    use crate::error::{AgentError, Result};

    /// OpenAI chat completions; the API key comes from `OPENAI_API_KEY`
    pub struct OpenAiModel {
        client: Client<OpenAIConfig>,
        model: String,
        max_tokens: u16,
        temperature: f32,
        timeout: Duration,
    }

    impl OpenAiModel {
        pub fn new(config: &LlmConfig) -> Self {
            Self {
                client: Client::new(),
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout: Duration::from_secs(config.timeout_secs),
            }
        }
    }

    fn model_error(e: impl std::fmt::Display) -> AgentError {
        AgentError::ModelError(e.to_string())
    }

    #[async_trait]
    impl LanguageModel for OpenAiModel {
        fn name(&self) -> &str {
            &self.model
        }

        async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .max_tokens(self.max_tokens)
                .temperature(self.temperature)
                .messages([
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(system)
                        .build()
                        .map_err(model_error)?
                        .into(),
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(prompt)
                        .build()
                        .map_err(model_error)?
                        .into(),
                ])
                .build()
                .map_err(model_error)?;

            let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
                .await
                .map_err(|_| AgentError::timeout(format!("model {}", self.model), self.timeout))?
                .map_err(model_error)?;

            response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| AgentError::ModelError("Model returned no content".to_string()))
        }
    }
}

/// Build the configured model, or `None` when none is usable
///
/// Rules-only categorization keeps working without a model, so a missing
/// key or a build without the `ml` feature is logged rather than fatal.
pub fn build_model(config: &LlmConfig) -> Option<Arc<dyn LanguageModel>> {
    #[cfg(feature = "ml")]
    {
        if std::env::var("OPENAI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
            tracing::warn!("OPENAI_API_KEY is not set; categorizing with rules only");
            return None;
        }
        tracing::info!("Using {} model {}", config.provider, config.model);
        Some(Arc::new(OpenAiModel::new(config)))
    }

    #[cfg(not(feature = "ml"))]
    {
        tracing::info!(
            "Built without the `ml` feature; model {} is unavailable, categorizing with rules only",
            config.model
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
            Ok(format!("{}|{}", system, prompt))
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let model: Arc<dyn LanguageModel> = Arc::new(EchoModel);
        assert_eq!(model.name(), "echo");
        assert_eq!(model.complete("sys", "hi").await.unwrap(), "sys|hi");
    }

    #[test]
    #[serial]
    fn test_build_model_without_key() {
        std::env::remove_var("OPENAI_API_KEY");
        assert!(build_model(&LlmConfig::default()).is_none());
    }
}
