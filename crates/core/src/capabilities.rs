//! Capability interfaces for the collaborators the interview core drives.
//!
//! Concrete backends (speech engines, webcams, window managers, embedding
//! models) live outside this crate and are plugged in through these traits.

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

/// Text-to-speech output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speaks `text` and returns only once playback has finished.
    async fn speak(&self, text: &str) -> Result<()>;
}

/// The result of one listening attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Speech(String),
    /// Nothing was said before the wait timeout elapsed.
    TimedOut,
    /// Audio was captured but could not be transcribed.
    Unrecognized,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("microphone unavailable: {0}")]
    Microphone(String),
    #[error("speech recognition request failed: {0}")]
    Request(String),
}

/// Speech-to-text input.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Listener: Send + Sync {
    /// Waits up to `timeout` for speech to start, then records at most
    /// `phrase_limit` of it.
    async fn listen(&self, timeout: Duration, phrase_limit: Duration)
    -> Result<Heard, SpeechError>;
}

/// What the attention detector concluded about a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttentionSignal {
    Normal,
    NoFace,
    MultipleFaces,
    LookingAway,
}

/// A captured video frame. Pixel layout is agreed between the frame source
/// and the detector; the core never inspects it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Exclusive handle on a camera. Owned by the attention watcher.
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self) -> Result<()>;
    async fn read_frame(&mut self) -> Result<Frame>;
    async fn release(&mut self);
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttentionDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> AttentionSignal;
}

/// Reports the title of the window that currently has focus.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WindowProbe: Send + Sync {
    async fn active_window_title(&self) -> Result<Option<String>>;
}

/// Maps text to a fixed-length vector.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
