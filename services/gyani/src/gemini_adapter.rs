//! Text generation through the Gemini `generateContent` endpoint.

use anyhow::Result;
use async_trait::async_trait;
use gyani_core::generator::TextGenerator;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, concatenated.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

pub struct GeminiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let resp = self
            .client
            .post(format!("{GEMINI_BASE_URL}/{}:generateContent", self.model))
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;

        resp.text()
            .ok_or_else(|| anyhow::anyhow!("No response from Gemini"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_parts_of_the_first_candidate() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"What is "},{"text":"a closure?"}],"role":"model"}},
                {"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("What is a closure?"));
    }

    #[test]
    fn blocked_responses_have_no_text() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(resp.text().is_none());

        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(resp.text().is_none());
    }
}
