use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Substituted whenever the text-generation backend fails, so the
/// conversation keeps moving.
pub const FALLBACK_REPLY: &str = "Could you elaborate on your experience with that technology?";

/// Substituted when the backend answers with nothing usable.
pub const EMPTY_REPLY: &str = "Could you tell me more about your experience with that?";

// The interview core only ever needs "prompt in, text out". Backends (Gemini,
// OpenAI, offline) implement this in the service crate; tests use the mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Runs the generator and returns trimmed, non-empty text, or `None` after
/// logging why nothing usable came back.
pub async fn try_generate(generator: &dyn TextGenerator, prompt: &str) -> Option<String> {
    match generator.generate_text(prompt).await {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                tracing::warn!("Text generation returned an empty response");
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Text generation failed");
            None
        }
    }
}

/// Like [`try_generate`] but never yields nothing: failures become
/// [`FALLBACK_REPLY`], empty answers [`EMPTY_REPLY`].
pub async fn generate_or_fallback(generator: &dyn TextGenerator, prompt: &str) -> String {
    match generator.generate_text(prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!("Text generation returned an empty response, using fallback");
            EMPTY_REPLY.to_string()
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Text generation failed, using fallback");
            FALLBACK_REPLY.to_string()
        }
    }
}

/// A generator that makes no network calls.
///
/// It answers with plausible canned text so an interview can be rehearsed
/// end-to-end without credentials. Interview questions rotate through a
/// fixed list.
#[derive(Default)]
pub struct OfflineGenerator {
    next_question: AtomicUsize,
}

const OFFLINE_QUESTIONS: &[&str] = &[
    "What project are you most proud of, and what was your role in it?",
    "How do you approach debugging a problem you have never seen before?",
    "Can you describe a trade-off you made recently and why you made it?",
    "How do you keep your knowledge of your field up to date?",
    "Tell me about a time you had to explain something complex to a colleague.",
    "What would you improve first in the last system you worked on?",
];

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let lower = prompt.to_lowercase();
        let reply = if lower.contains("coding problem") {
            "Problem: Given a list of integers, return the length of the longest strictly increasing contiguous run.\n\nExample Input: [1, 2, 2, 3, 4, 1]\nExample Output: 3\n\nConstraints: The list may be empty."
                .to_string()
        } else if lower.contains("give a small hint") {
            "Hint: Walk the list once and keep track of the current run length.".to_string()
        } else if lower.contains("rephrase") {
            "Could you put that another way: what was your reasoning behind it?".to_string()
        } else if lower.contains("couldn't answer") {
            "No problem. The key idea is to reason from the requirements to a concrete example, then generalise.".to_string()
        } else if lower.contains("answer to this") || lower.contains("detailed explanation") {
            "That depends on context, but a good rule of thumb is to start simple, measure, and only then optimise. Would you like me to clarify anything?".to_string()
        } else {
            let idx = self.next_question.fetch_add(1, Ordering::Relaxed);
            OFFLINE_QUESTIONS[idx % OFFLINE_QUESTIONS.len()].to_string()
        };
        Ok(reply)
    }
}
