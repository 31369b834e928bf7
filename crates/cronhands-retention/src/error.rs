//! Sweep errors.

use std::path::PathBuf;

use thiserror::Error;

/// A problem with one entry or pattern. Recorded in the sweep report; the
/// sweep carries on with the remaining entries.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inspect {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SweepError {
    /// The path the error is about, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            SweepError::Pattern { .. } => None,
            SweepError::ReadDir { path, .. }
            | SweepError::Metadata { path, .. }
            | SweepError::Delete { path, .. } => Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_display() {
        let err = SweepError::Delete {
            path: PathBuf::from("/logs/scraper_20240101_080000.log"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("scraper_20240101_080000.log"));
        assert!(msg.contains("denied"));
        assert!(err.path().is_some());
    }

    #[test]
    fn test_pattern_has_no_path() {
        let err = SweepError::Pattern {
            pattern: "[".to_string(),
            reason: "unclosed".to_string(),
        };
        assert!(err.path().is_none());
        assert!(err.to_string().contains("'['"));
    }
}
