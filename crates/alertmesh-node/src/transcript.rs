//! Plain-text transcript of received messages.
//!
//! The file is opened once at startup in append mode (created if
//! missing) and every received line is appended with a trailing newline.
//! Failing to open the file is a setup error; failing to write one line
//! is logged and the node keeps running.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use alertmesh_types::{AlertmeshError, Result};

/// Append-only transcript file.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: File,
}

impl Transcript {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AlertmeshError::StorageError`] if the file cannot be
    /// opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o644);
        let file = options.open(&path).await.map_err(|e| AlertmeshError::StorageError {
            reason: format!("failed to open transcript '{}': {e}", path.display()),
        })?;
        tracing::info!(path = %path.display(), "transcript opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `line` followed by a newline and flushes.
    pub async fn append_line(&mut self, line: &str) -> Result<()> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        self.file
            .write_all(record.as_bytes())
            .await
            .map_err(|e| AlertmeshError::StorageError {
                reason: format!("failed to write transcript: {e}"),
            })?;
        self.file.flush().await.map_err(|e| AlertmeshError::StorageError {
            reason: format!("failed to flush transcript: {e}"),
        })
    }

    /// Like [`append_line`](Self::append_line) but only logs a failure.
    pub async fn record(&mut self, line: &str) {
        if let Err(e) = self.append_line(line).await {
            tracing::warn!(path = %self.path.display(), %e, "transcript write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_lines_with_newline() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| AlertmeshError::StorageError {
            reason: e.to_string(),
        })?;
        let path = dir.path().join("logs.txt");

        let mut transcript = Transcript::open(&path).await?;
        transcript.append_line("one").await?;
        transcript.record("two").await;

        let text = std::fs::read_to_string(&path).unwrap_or_default();
        assert_eq!(text, "one\ntwo\n");
        Ok(())
    }

    #[tokio::test]
    async fn reopening_keeps_existing_content() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| AlertmeshError::StorageError {
            reason: e.to_string(),
        })?;
        let path = dir.path().join("logs.txt");

        Transcript::open(&path).await?.append_line("before restart").await?;
        Transcript::open(&path).await?.append_line("after restart").await?;

        let text = std::fs::read_to_string(&path).unwrap_or_default();
        assert_eq!(text, "before restart\nafter restart\n");
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_storage_error() {
        let result = Transcript::open("/nonexistent-alertmesh-dir/logs.txt").await;
        assert!(matches!(result, Err(AlertmeshError::StorageError { .. })));
    }
}
