//! In-memory message log served by the HTTP bridge.
//!
//! Holds the formatted lines of every sent and received message for the
//! lifetime of the process. One mutex guards every append and read, so
//! a snapshot never observes a half-applied append.

use std::sync::{Arc, Mutex};

use alertmesh_types::{AlertmeshError, Result};

/// Shared, append-only list of message lines. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line.
    ///
    /// # Errors
    ///
    /// Returns [`AlertmeshError::StorageError`] if the lock is poisoned.
    pub fn append(&self, line: impl Into<String>) -> Result<()> {
        let mut lines = self.lines.lock().map_err(|e| AlertmeshError::StorageError {
            reason: format!("message log lock poisoned: {e}"),
        })?;
        lines.push(line.into());
        Ok(())
    }

    /// Returns a copy of every line, oldest first.
    pub fn snapshot(&self) -> Result<Vec<String>> {
        let lines = self.lines.lock().map_err(|e| AlertmeshError::StorageError {
            reason: format!("message log lock poisoned: {e}"),
        })?;
        Ok(lines.clone())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() -> Result<()> {
        let log = MessageLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot()?.is_empty());
        Ok(())
    }

    #[test]
    fn preserves_append_order() -> Result<()> {
        let log = MessageLog::new();
        log.append("first")?;
        log.append(String::from("second"))?;
        assert_eq!(log.snapshot()?, vec!["first".to_string(), "second".to_string()]);
        Ok(())
    }

    #[test]
    fn clones_share_lines() -> Result<()> {
        let log = MessageLog::new();
        let writer = log.clone();
        writer.append("shared")?;
        assert_eq!(log.len(), 1);
        Ok(())
    }

    #[test]
    fn concurrent_appends_are_all_kept() -> Result<()> {
        let log = MessageLog::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let _ = log.append(format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        assert_eq!(log.snapshot()?.len(), 400);
        Ok(())
    }
}
