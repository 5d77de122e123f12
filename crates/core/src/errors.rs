//! Error types for the reposync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from working-copy and remote operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path does not exist or is not inside a git repository.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// The repository is bare, so there is no working tree to update.
    #[error("repository at '{0}' has no working tree")]
    NoWorktree(String),

    /// A ref (branch, remote-tracking ref) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// HEAD is detached or on a different branch than the bound one.
    #[error("HEAD is on '{actual}', expected '{expected}'")]
    HeadNotOnBranch { expected: String, actual: String },

    /// The remote rejected the SSH identity.
    #[error("authentication failed for '{remote}': {detail}")]
    AuthenticationFailed { remote: String, detail: String },

    /// The remote refused to update a ref during push.
    #[error("git push rejected for '{refname}': {detail}")]
    PushRejected { refname: String, detail: String },

    /// The SSH identity could not be loaded.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),
}

impl GitError {
    /// Map a `git2` error raised while talking to `remote`.
    ///
    /// Only `ErrorCode::Auth` counts as an authentication failure. Other SSH
    /// transport errors (host key, handshake) stay `Git2Error`.
    pub fn from_git2(remote: &str, err: git2::Error) -> Self {
        if err.code() == git2::ErrorCode::Auth {
            GitError::AuthenticationFailed {
                remote: remote.to_string(),
                detail: err.message().to_string(),
            }
        } else {
            GitError::Git2Error(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Credential errors
// ---------------------------------------------------------------------------

/// Errors from resolving the SSH identity used for transport authentication.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The invoking user's home directory could not be determined.
    #[error("unable to resolve the home directory for the current user")]
    HomeDirUnavailable,

    /// The private key file does not exist.
    #[error("ssh private key not found at '{}'", .0.display())]
    KeyNotFound(PathBuf),

    /// The private key file exists but could not be read.
    #[error("failed to read ssh private key '{}': {source}", .path.display())]
    KeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key material is not a recognizable private key.
    #[error("malformed ssh private key from {origin}")]
    MalformedKey { origin: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// YAML decode error, either malformed input or a shape mismatch.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Logging errors
// ---------------------------------------------------------------------------

/// Errors from installing the global logger.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global `tracing` subscriber is already installed.
    #[error("a global logger has already been initialized: {0}")]
    AlreadyInitialized(String),
}
