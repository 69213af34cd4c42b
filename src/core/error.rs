/// Error taxonomy for backup and restore operations
///
/// Anything that can go wrong while talking to the Docker daemon itself
/// (transport, API errors) is carried as `Runtime`; the remaining variants
/// describe domain failures the CLI reports with volume and phase.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("volume name '{0}' contains no filesystem-safe characters")]
    InvalidVolumeName(String),

    #[error("failed to prepare backup path {path}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archiver exited with code {code} while backing up volume '{volume}'")]
    Archive { volume: String, code: i64 },

    #[error("archive {path} failed integrity verification")]
    CorruptArchive { path: PathBuf },

    #[error("archive not found: {path}")]
    ArchiveNotFound { path: PathBuf },

    #[error("restore of volume '{volume}' failed while {phase}")]
    RestoreFailed {
        volume: String,
        phase: RestorePhase,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

/// Phase of the restore state machine a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Stopping,
    Removing,
    Creating,
    Extracting,
    Restarting,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            RestorePhase::Stopping => "stopping dependent containers",
            RestorePhase::Removing => "removing the existing volume",
            RestorePhase::Creating => "recreating the volume",
            RestorePhase::Extracting => "extracting the archive",
            RestorePhase::Restarting => "restarting dependent containers",
        };
        write!(f, "{}", phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_volume_and_phase() {
        let err = BackupError::Archive {
            volume: "app_data".to_string(),
            code: 2,
        };
        assert!(err.to_string().contains("app_data"));
        assert!(err.to_string().contains("code 2"));

        let err = BackupError::RestoreFailed {
            volume: "db".to_string(),
            phase: RestorePhase::Extracting,
            source: anyhow::anyhow!("extractor exited with code 1"),
        };
        assert!(err.to_string().contains("db"));
        assert!(err.to_string().contains("extracting the archive"));
    }
}
