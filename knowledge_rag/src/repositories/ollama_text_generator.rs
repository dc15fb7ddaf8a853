use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ports::text_generator::{GenerationError, TextGenerator};

/// Text generation with a model served by Ollama, through its `/api/generate` endpoint
pub struct OllamaTextGenerator {
    client: reqwest::Client,
    /// For ex: `http://localhost:11434`
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaTextGenerator {
    pub fn try_new(
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OllamaTextGenerator {
    #[tracing::instrument(name = "Generating text with Ollama", skip(self, prompt, system_prompt))]
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let response = self
            .client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Generator(format!(
                "Ollama answered with {}: {}",
                status, body
            )));
        }

        let generated = response.json::<GenerateResponse>().await?.response;
        info!(model = %self.model, "Generated {} characters", generated.len());

        Ok(generated.trim().to_string())
    }
}
