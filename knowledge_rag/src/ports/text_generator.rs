use async_trait::async_trait;
use common::helper::error_chain_fmt;

/// External text generation (a language model), treated as a black box
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

#[derive(thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),
    #[error("Text generation failed: {0}")]
    Generator(String),
}

impl std::fmt::Debug for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
