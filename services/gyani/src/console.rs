//! Terminal stand-ins for speech: the interviewer's lines are printed and the
//! candidate types answers on stdin.

use anyhow::Result;
use async_trait::async_trait;
use gyani_core::capabilities::{Heard, Listener, Speaker, SpeechError};
use std::io::{self, BufRead};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

const LINE_BUFFER: usize = 16;

pub struct ConsoleSpeaker<W> {
    out: Mutex<W>,
}

impl ConsoleSpeaker<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleSpeaker<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Speaker for ConsoleSpeaker<W> {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(format!("Gyani: {text}\n").as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

/// Reads one line per listening attempt. The phrase limit does not apply to
/// typed input.
///
/// Lines are read on a dedicated thread so a pending read never holds up
/// runtime shutdown.
pub struct ConsoleListener {
    lines: Mutex<mpsc::Receiver<io::Result<String>>>,
}

impl ConsoleListener {
    pub fn stdin() -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::spawn(move || {
            for line in reader.lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self::from_channel(rx)
    }

    pub fn from_channel(lines: mpsc::Receiver<io::Result<String>>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }
}

#[async_trait]
impl Listener for ConsoleListener {
    async fn listen(
        &self,
        timeout: Duration,
        _phrase_limit: Duration,
    ) -> Result<Heard, SpeechError> {
        let mut lines = self.lines.lock().await;
        match tokio::time::timeout(timeout, lines.recv()).await {
            Err(_) => Ok(Heard::TimedOut),
            Ok(Some(Ok(line))) if line.trim().is_empty() => Ok(Heard::Unrecognized),
            Ok(Some(Ok(line))) => Ok(Heard::Speech(line.trim().to_string())),
            Ok(Some(Err(e))) => Err(SpeechError::Microphone(e.to_string())),
            Ok(None) => Err(SpeechError::Microphone("input closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn reads_one_answer_per_listen() {
        let listener =
            ConsoleListener::from_reader(io::Cursor::new(b"I use Rust daily\n\nbye\n".to_vec()));
        assert_eq!(
            listener.listen(WAIT, WAIT).await.unwrap(),
            Heard::Speech("I use Rust daily".into())
        );
        assert_eq!(listener.listen(WAIT, WAIT).await.unwrap(), Heard::Unrecognized);
        assert_eq!(
            listener.listen(WAIT, WAIT).await.unwrap(),
            Heard::Speech("bye".into())
        );
        assert!(matches!(
            listener.listen(WAIT, WAIT).await,
            Err(SpeechError::Microphone(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (_tx, rx) = mpsc::channel(1);
        let listener = ConsoleListener::from_channel(rx);
        assert_eq!(
            listener.listen(Duration::from_secs(15), WAIT).await.unwrap(),
            Heard::TimedOut
        );
    }

    #[tokio::test]
    async fn speaker_prefixes_lines() {
        let speaker = ConsoleSpeaker::new(Vec::new());
        speaker.speak("Hello!").await.unwrap();
        assert_eq!(speaker.out.lock().await.as_slice(), b"Gyani: Hello!\n");
    }
}
