//! OpenAI chat completions and embeddings.

use anyhow::Result;
use async_trait::async_trait;
use gyani_core::capabilities::Embedder;
use gyani_core::generator::TextGenerator;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
}

pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmResponse>()
            .await?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))
    }
}

/// Embeddings shortened server-side to the configured dimension.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: SecretString,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: SecretString, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": EMBEDDING_MODEL,
            "input": text,
            "dimensions": self.dimension,
        });

        let resp = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        let embedding = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("No embedding in response"))?;
        if embedding.len() != self.dimension {
            anyhow::bail!(
                "expected a {}-dimensional embedding, got {}",
                self.dimension,
                embedding.len()
            );
        }
        Ok(embedding)
    }
}
