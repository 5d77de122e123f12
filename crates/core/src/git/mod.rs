//! Git working-copy synchronization over SSH.

pub mod credentials;
pub mod remote_url;
pub mod sync;

pub use credentials::{CredentialSource, SshIdentity};
pub use remote_url::RemoteKind;
pub use sync::{CommitAuthor, HeadState, PullOutcome, RepositorySync};
