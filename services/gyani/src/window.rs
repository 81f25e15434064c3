//! Active-window probe backed by `xdotool`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gyani_core::capabilities::WindowProbe;
use tokio::process::Command;

#[derive(Debug, Default)]
pub struct XdotoolProbe;

impl XdotoolProbe {
    /// Checks once that `xdotool` can be run at all.
    pub async fn detect() -> Result<Self> {
        Command::new("xdotool")
            .arg("version")
            .output()
            .await
            .context("xdotool is not available")?;
        Ok(Self)
    }
}

#[async_trait]
impl WindowProbe for XdotoolProbe {
    async fn active_window_title(&self) -> Result<Option<String>> {
        let output = Command::new("xdotool")
            .args(["getactivewindow", "getwindowname"])
            .output()
            .await
            .context("Failed to run xdotool")?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_title(&output.stdout))
    }
}

fn parse_title(stdout: &[u8]) -> Option<String> {
    let title = String::from_utf8_lossy(stdout).trim().to_string();
    (!title.is_empty()).then_some(title)
}
