//! reposync core library.
//!
//! This crate provides the building blocks for keeping local working copies
//! in sync with a remote branch: the SSH-authenticated [`RepositorySync`]
//! binding, YAML configuration loading, and logger construction.

pub mod config;
pub mod errors;
pub mod git;
pub mod logging;

// Re-exports for convenience.
pub use config::{load_yaml_file, load_yaml_file_into, AppConfig};
pub use errors::CoreError;
pub use git::{CredentialSource, PullOutcome, RepositorySync};
pub use logging::init_logger;
