//! Document text extraction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentryError, Result};
use crate::util::with_timeout;

/// Produces plain text from a document on disk.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads UTF-8 text files.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Runs `pdftotext -layout <file> -` and returns its stdout.
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    program: PathBuf,
    timeout: Duration,
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl PdftotextExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
            timeout,
        }
    }

    /// Use a different `pdftotext` binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl TextExtractor for PdftotextExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        let output = with_timeout(self.timeout, async {
            tokio::process::Command::new(&self.program)
                .arg("-layout")
                .arg(path)
                .arg("-")
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        AgentryError::Configuration(format!(
                            "'{}' not found; install poppler-utils to ingest PDFs",
                            self.program.display()
                        ))
                    } else {
                        AgentryError::Io(err)
                    }
                })
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentryError::InvalidArgument(format!(
                "pdftotext failed for '{}' ({}): {}",
                path.display(),
                output.status,
                stderr.trim()
            )));
        }
        // Form feeds separate pages.
        Ok(String::from_utf8_lossy(&output.stdout).replace('\u{c}', "\n"))
    }
}

/// Picks an extractor by file extension: `.pdf` goes to pdftotext, everything else is read as text.
#[derive(Debug, Clone, Default)]
pub struct AutoExtractor {
    pdf: PdftotextExtractor,
    plain: PlainTextExtractor,
}

impl AutoExtractor {
    pub fn new(pdf: PdftotextExtractor) -> Self {
        Self {
            pdf,
            plain: PlainTextExtractor,
        }
    }
}

#[async_trait]
impl TextExtractor for AutoExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            self.pdf.extract(path).await
        } else {
            self.plain.extract(path).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two").unwrap();

        let text = AutoExtractor::default().extract(&path).await.unwrap();

        assert_eq!(text, "line one\nline two");
    }

    #[tokio::test]
    async fn missing_pdftotext_binary_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.PDF");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let extractor = AutoExtractor::new(
            PdftotextExtractor::default().with_program("/nonexistent/pdftotext-agentry"),
        );

        let err = extractor.extract(&path).await.unwrap_err();

        assert!(matches!(err, AgentryError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = PlainTextExtractor
            .extract(Path::new("/nonexistent/agentry/file.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentryError::Io(_)));
    }
}
