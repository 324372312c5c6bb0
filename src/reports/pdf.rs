//! HTML to PDF conversion.
//!
//! Rendering is delegated to an external converter (wkhtmltopdf by default)
//! invoked as `<command> <args..> <input.html> <output.pdf>`.

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::core::config::ReportConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PdfError {
    #[error("could not start converter: {0}")]
    Spawn(String),
    #[error("converter timed out after {0:?}")]
    Timeout(Duration),
    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("converter produced no output")]
    EmptyOutput,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PdfError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, PdfError>;
}

#[derive(Debug, Clone)]
pub struct CommandPdfConverter {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    work_dir: PathBuf,
}

impl CommandPdfConverter {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            config.pdf_command.clone(),
            config.pdf_args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    async fn run(&self, input: &PathBuf, output: &PathBuf) -> Result<Vec<u8>, PdfError> {
        let child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PdfError::Spawn(format!("{}: {e}", self.command)))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PdfError::Timeout(self.timeout))??;

        if !result.status.success() {
            return Err(PdfError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(output).await?;
        if bytes.is_empty() {
            return Err(PdfError::EmptyOutput);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl PdfConverter for CommandPdfConverter {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, PdfError> {
        let stem = Uuid::new_v4();
        let input = self.work_dir.join(format!("grc-report-{stem}.html"));
        let output = self.work_dir.join(format!("grc-report-{stem}.pdf"));

        tokio::fs::write(&input, html).await?;
        debug!("Converting {} with {}", input.display(), self.command);
        let result = self.run(&input, &output).await;

        let _ = tokio::fs::remove_file(&input).await;
        let _ = tokio::fs::remove_file(&output).await;
        result
    }
}

/// In-memory converter returning a fixed PDF prefix plus the HTML; can fail a set number of times.
#[derive(Debug, Default)]
pub struct StaticPdfConverter {
    failures_left: Mutex<u32>,
    calls: Mutex<u32>,
}

impl StaticPdfConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl PdfConverter for StaticPdfConverter {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, PdfError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if let Ok(mut left) = self.failures_left.lock() {
            if *left > 0 {
                *left -= 1;
                return Err(PdfError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "simulated failure".to_string(),
                });
            }
        }
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.extend_from_slice(html.as_bytes());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_converter_fails_then_succeeds() {
        let converter = StaticPdfConverter::failing(1);
        assert!(converter.convert("<p>x</p>").await.is_err());
        let pdf = converter.convert("<p>x</p>").await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(converter.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let converter = CommandPdfConverter::new(
            "grcserver-no-such-converter",
            vec![],
            Duration::from_secs(5),
        )
        .with_work_dir(dir.path());
        assert!(matches!(
            converter.convert("<p>x</p>").await,
            Err(PdfError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_converter_copies_output() {
        let dir = tempfile::tempdir().unwrap();
        // `cp <input> <output>` stands in for a real converter.
        let converter = CommandPdfConverter::new("cp", vec![], Duration::from_secs(5))
            .with_work_dir(dir.path());
        let bytes = converter.convert("<p>hello</p>").await.unwrap();
        assert_eq!(bytes, b"<p>hello</p>");
    }
}
