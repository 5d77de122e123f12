//! Working-copy synchronization against a single remote branch.
//!
//! [`RepositorySync`] binds a remote locator, a branch and a local path, and
//! offers the three operations needed to keep them aligned: clone if absent,
//! pull with conflict tolerance, and commit-and-push of every local change.
//! All operations block until libgit2 finishes; none of them retries.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, Reference, Repository,
    RepositoryOpenFlags, Signature,
};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;
use crate::git::credentials::{CredentialSource, SshIdentity};

/// Name of the remote every operation talks to.
pub const REMOTE_NAME: &str = "origin";

/// Identity recorded on commits created by [`RepositorySync::commit_and_push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// What HEAD of a working copy resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD points at a commit with this id.
    Commit(String),
    /// The repository exists but its current branch has no commits yet.
    Unborn,
}

/// Result of a successful [`RepositorySync::pull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The local branch was fast-forwarded. `from` is `None` when the branch
    /// had no commits before the pull.
    Updated { from: Option<String>, to: String },
    /// Local and remote already point at the same commit.
    AlreadyCurrent,
    /// Local history has diverged from the remote. Nothing was changed and
    /// the working copy may be stale.
    DivergedNonFastForward { local: String, remote: String },
}

impl PullOutcome {
    /// Whether the pull moved the local branch.
    pub fn changed(&self) -> bool {
        matches!(self, PullOutcome::Updated { .. })
    }
}

/// A local working copy bound to one branch of one remote.
///
/// The binding is fixed at construction: `branch_ref` is derived from
/// `branch_name` once and the fields are never mutated afterwards. Values are
/// plain data, so clones are independent. Two values bound to the same
/// `local_path` must not be used concurrently.
#[derive(Debug, Clone)]
pub struct RepositorySync {
    remote: String,
    branch_name: String,
    branch_ref: String,
    local_path: PathBuf,
    credentials: CredentialSource,
    author: Option<CommitAuthor>,
}

impl RepositorySync {
    /// Bind `remote` / `branch_name` to `local_path`, authenticating with
    /// `~/.ssh/id_rsa`.
    pub fn new(
        remote: impl Into<String>,
        branch_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        let branch_name = branch_name.into();
        let branch_ref = format!("refs/heads/{branch_name}");
        Self {
            remote: remote.into(),
            branch_name,
            branch_ref,
            local_path: local_path.into(),
            credentials: CredentialSource::default(),
            author: None,
        }
    }

    /// Replace the SSH identity source.
    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    /// Record commits as `author` instead of the repository's configured
    /// `user.name` / `user.email`.
    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = Some(author);
        self
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn branch_ref(&self) -> &str {
        &self.branch_ref
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }

    // -----------------------------------------------------------------------
    // HEAD inspection
    // -----------------------------------------------------------------------

    /// Resolve HEAD of the working copy.
    pub fn head(&self) -> Result<HeadState, GitError> {
        let repo = self.open()?;
        head_state(&repo)
    }

    /// Best-effort HEAD commit id.
    ///
    /// Returns an empty string when the path is not a repository, HEAD is
    /// unborn, or the commit cannot be read. Use [`head`](Self::head) when
    /// those cases must be told apart.
    pub fn head_commit_id(&self) -> String {
        match self.head() {
            Ok(HeadState::Commit(id)) => id,
            Ok(HeadState::Unborn) => String::new(),
            Err(e) => {
                debug!(path = %self.local_path.display(), error = %e, "head commit unavailable");
                String::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clone
    // -----------------------------------------------------------------------

    /// Clone only `branch_name` of the remote into `local_path`.
    ///
    /// libgit2 refuses a destination that already holds files.
    #[instrument(skip(self), fields(remote = %self.remote, branch = %self.branch_name, path = %self.local_path.display()))]
    pub fn clone_repo(&self) -> Result<(), GitError> {
        let identity = self.credentials.load()?;
        info!("cloning repository");

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(identity.remote_callbacks(&self.remote));

        let refspec = self.tracking_refspec();
        let mut builder = RepoBuilder::new();
        builder
            .branch(&self.branch_name)
            .fetch_options(fetch_opts)
            .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));
        builder
            .clone(&self.remote, &self.local_path)
            .map_err(|e| GitError::from_git2(&self.remote, e))?;

        info!("clone completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    /// Fetch `branch_ref` from `origin` and fast-forward the local branch.
    ///
    /// An up-to-date branch and a diverged branch both count as success; see
    /// [`PullOutcome`]. A diverged branch is left exactly as it was.
    #[instrument(skip(self), fields(branch = %self.branch_name, path = %self.local_path.display()))]
    pub fn pull(&self) -> Result<PullOutcome, GitError> {
        let repo = self.open()?;
        if repo.is_bare() {
            return Err(GitError::NoWorktree(self.local_path.display().to_string()));
        }
        let identity = self.credentials.load()?;

        self.fetch(&repo, &identity)?;

        let tracking_ref = self.tracking_ref();
        let fetched = repo
            .find_reference(&tracking_ref)
            .map_err(|_| GitError::RefNotFound(tracking_ref.clone()))?;
        let fetched_commit = repo.reference_to_annotated_commit(&fetched)?;
        let remote_id = fetched_commit.id();

        let local_ref = match repo.find_reference(&self.branch_ref) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.checkout_if_head(&repo, remote_id)?;
                repo.reference(&self.branch_ref, remote_id, false, "reposync: initial pull")?;
                info!(to = %remote_id, "created local branch from remote");
                return Ok(PullOutcome::Updated {
                    from: None,
                    to: remote_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let local_id = local_ref.peel_to_commit()?.id();

        let (analysis, _) = repo.merge_analysis_for_ref(&local_ref, &[&fetched_commit])?;
        if analysis.is_up_to_date() {
            debug!(head = %local_id, "already up to date");
            return Ok(PullOutcome::AlreadyCurrent);
        }
        if analysis.is_fast_forward() || analysis.is_unborn() {
            self.fast_forward(&repo, local_ref, remote_id)?;
            info!(from = %local_id, to = %remote_id, "fast-forwarded");
            return Ok(PullOutcome::Updated {
                from: Some(local_id.to_string()),
                to: remote_id.to_string(),
            });
        }

        warn!(
            local = %local_id,
            remote = %remote_id,
            "local branch has diverged from remote, leaving working copy unchanged"
        );
        Ok(PullOutcome::DivergedNonFastForward {
            local: local_id.to_string(),
            remote: remote_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Commit and push
    // -----------------------------------------------------------------------

    /// Stage every change in the working tree, commit it with `message` and
    /// push `branch_ref` to `origin`. Returns the new commit id.
    ///
    /// HEAD must be on `branch_ref`; a detached HEAD or another checked-out
    /// branch fails with [`GitError::HeadNotOnBranch`] before anything is
    /// staged.
    ///
    /// A clean working tree still produces an (empty) commit. If the push
    /// fails the commit stays in local history.
    #[instrument(skip(self, message), fields(branch = %self.branch_name, path = %self.local_path.display()))]
    pub fn commit_and_push(&self, message: &str) -> Result<String, GitError> {
        let repo = self.discover()?;
        if repo.is_bare() {
            return Err(GitError::NoWorktree(self.local_path.display().to_string()));
        }
        match head_branch(&repo) {
            Some(branch) if branch == self.branch_ref => {}
            other => {
                return Err(GitError::HeadNotOnBranch {
                    expected: self.branch_ref.clone(),
                    actual: other.unwrap_or_else(|| "detached HEAD".to_string()),
                })
            }
        }

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;

        let signature = self.signature(&repo)?;
        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!(sha = %oid, "created commit");

        let identity = self.credentials.load()?;
        self.push(&repo, &identity)?;
        Ok(oid.to_string())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Open exactly `local_path`, without searching parent directories.
    fn open(&self) -> Result<Repository, GitError> {
        Repository::open(&self.local_path)
            .map_err(|_| GitError::RepositoryNotFound(self.local_path.display().to_string()))
    }

    /// Open the repository containing `local_path`, searching upwards.
    /// Linked worktrees resolve through their common directory.
    fn discover(&self) -> Result<Repository, GitError> {
        Repository::open_ext(
            &self.local_path,
            RepositoryOpenFlags::empty(),
            std::iter::empty::<&OsStr>(),
        )
        .map_err(|_| GitError::RepositoryNotFound(self.local_path.display().to_string()))
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{REMOTE_NAME}/{}", self.branch_name)
    }

    fn tracking_refspec(&self) -> String {
        format!("+{}:{}", self.branch_ref, self.tracking_ref())
    }

    fn fetch(&self, repo: &Repository, identity: &SshIdentity) -> Result<(), GitError> {
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let url = remote.url().unwrap_or(self.remote.as_str()).to_string();
        debug!(remote = %url, "fetching");

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(identity.remote_callbacks(&url));
        remote
            .fetch(&[self.tracking_refspec().as_str()], Some(&mut fetch_opts), None)
            .map_err(|e| GitError::from_git2(&url, e))?;
        Ok(())
    }

    fn fast_forward(
        &self,
        repo: &Repository,
        mut local_ref: Reference<'_>,
        target: Oid,
    ) -> Result<(), GitError> {
        self.checkout_if_head(repo, target)?;
        local_ref.set_target(target, &format!("reposync: fast-forward to {target}"))?;
        Ok(())
    }

    /// Update the working tree to `target` when HEAD is on `branch_ref`.
    ///
    /// Uses a safe checkout, so uncommitted edits to files that would change
    /// abort the pull before any ref moves.
    fn checkout_if_head(&self, repo: &Repository, target: Oid) -> Result<(), GitError> {
        if head_branch(repo).as_deref() != Some(self.branch_ref.as_str()) {
            return Ok(());
        }
        let commit = repo.find_commit(target)?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        Ok(())
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, GitError> {
        match &self.author {
            Some(author) => Ok(Signature::now(&author.name, &author.email)?),
            None => Ok(repo.signature()?),
        }
    }

    fn push(&self, repo: &Repository, identity: &SshIdentity) -> Result<(), GitError> {
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let url = remote.url().unwrap_or(self.remote.as_str()).to_string();
        info!(remote = %url, refname = %self.branch_ref, "pushing");

        let rejection = Arc::new(Mutex::new(None::<(String, String)>));
        let rejection_slot = rejection.clone();
        let mut callbacks = identity.remote_callbacks(&url);
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                if let Ok(mut slot) = rejection_slot.lock() {
                    *slot = Some((refname.to_string(), msg.to_string()));
                }
            }
            Ok(())
        });

        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        let refspec = format!("{0}:{0}", self.branch_ref);
        remote
            .push(&[refspec.as_str()], Some(&mut push_opts))
            .map_err(|e| GitError::from_git2(&url, e))?;

        let rejected = rejection.lock().ok().and_then(|mut slot| slot.take());
        if let Some((refname, detail)) = rejected {
            return Err(GitError::PushRejected { refname, detail });
        }
        info!("push completed");
        Ok(())
    }
}

/// The ref HEAD points at, or `None` when HEAD is detached.
fn head_branch(repo: &Repository) -> Option<String> {
    repo.find_reference("HEAD")
        .ok()
        .and_then(|head| head.symbolic_target().map(str::to_string))
}

fn head_state(repo: &Repository) -> Result<HeadState, GitError> {
    match repo.head() {
        Ok(head) => Ok(HeadState::Commit(head.peel_to_commit()?.id().to_string())),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(HeadState::Unborn)
        }
        Err(e) => Err(e.into()),
    }
}
