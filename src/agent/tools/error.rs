//! Error types for tool installation and process supervision.
//!
//! The coordinator is the only consumer of these; it flattens them into the
//! `{ok, error}` shape before anything crosses the API boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while streaming an artifact to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection, TLS or mid-stream transport failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a status >= 400
    #[error("Download failed: HTTP {status}")]
    Http { status: u16 },

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by [`super::installer::Installer`].
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The artifact is kept at `path` for inspection.
    #[error("Checksum mismatch for {}", .path.display())]
    Checksum { path: PathBuf },

    #[error("Extraction failed for {}", .path.display())]
    Extraction { path: PathBuf },

    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`super::supervisor::Supervisor`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Already running: {0}")]
    AlreadyRunning(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    #[error("Failed to spawn {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_carries_status() {
        let err = DownloadError::Http { status: 404 };
        assert_eq!(err.to_string(), "Download failed: HTTP 404");

        let err: InstallError = err.into();
        assert!(matches!(
            err,
            InstallError::Download(DownloadError::Http { status: 404 })
        ));
    }

    #[test]
    fn test_supervisor_error_messages() {
        assert_eq!(
            SupervisorError::AlreadyRunning("nginx".into()).to_string(),
            "Already running: nginx"
        );
        assert_eq!(
            SupervisorError::NotRunning("redis".into()).to_string(),
            "Not running: redis"
        );
    }
}
