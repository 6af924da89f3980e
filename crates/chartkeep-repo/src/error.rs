//! Error types for repository operations

use std::path::PathBuf;

use thiserror::Error;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Registration Errors ============
    #[error("Repository name ({name}) contains '/', please specify a different name without '/'")]
    InvalidName { name: String },

    #[error("Repository \"{name}\" already exists with the same configuration, skipping")]
    DuplicateEntry { name: String },

    #[error("Repository name ({name}) already exists, please specify a different name")]
    NameConflict { name: String },

    #[error("Looks like \"{url}\" is not a valid chart repository or cannot be reached: {source}")]
    RepositoryUnreachable {
        url: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Failed to update repositories:\n{failures}")]
    UpdateFailed { failures: String },

    // ============ Storage Errors ============
    #[error("Failed to access {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid repository file {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    // ============ Lock Errors ============
    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {seconds}s waiting for lock on {}", path.display())]
    LockTimeout { path: PathBuf, seconds: u64 },

    // ============ Configuration Errors ============
    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid TLS configuration: {message}")]
    TlsConfig { message: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    // ============ Authentication Errors ============
    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    // ============ Index Errors ============
    #[error("Invalid index format: {message}")]
    InvalidIndex { message: String },

    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    // ============ Other ============
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Wrap an I/O error with the path it happened on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepoError::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_keeps_source() {
        let err = RepoError::RepositoryUnreachable {
            url: "https://charts.example.com".to_string(),
            source: Box::new(RepoError::HttpError {
                status: 404,
                message: "Request to https://charts.example.com/index.yaml failed".to_string(),
            }),
        };

        let msg = err.to_string();
        assert!(msg.contains("https://charts.example.com"));
        assert!(msg.contains("404"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_storage_display_includes_path() {
        let err = RepoError::storage(
            "/tmp/repositories.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/repositories.yaml"));
    }
}
