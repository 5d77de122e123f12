//! reposync command-line tool.
//!
//! Clones, pulls and publishes the working copies listed in a YAML
//! configuration file, and prints their HEAD commits.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use reposync_core::config::{AppConfig, RepositoryConfig};
use reposync_core::errors::GitError;
use reposync_core::git::{CredentialSource, HeadState, PullOutcome, RemoteKind, RepositorySync};
use reposync_core::logging;

use crate::style::Mark;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// reposync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "reposync",
    version,
    about = "Keep local working copies in sync with a remote branch over SSH"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, default_value = "reposync.yaml")]
    config: PathBuf,

    /// Debug logging with timestamps and call sites. Overrides the config file.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./reposync.yaml")]
        output: PathBuf,
    },

    /// Validate the configuration file.
    Validate,

    /// Clone repositories that have no working copy yet.
    Clone {
        /// Repository name (default: all).
        name: Option<String>,
    },

    /// Fetch and fast-forward working copies.
    Pull {
        /// Repository name (default: all).
        name: Option<String>,
    },

    /// Commit every local change and push it.
    Push {
        /// Commit message.
        #[arg(short, long)]
        message: String,

        /// Repository name (default: all).
        name: Option<String>,
    },

    /// Show the HEAD commit of working copies.
    Head {
        /// Repository name (default: all).
        name: Option<String>,
    },

    /// Clone if absent, otherwise pull.
    Sync {
        /// Repository name (default: all).
        name: Option<String>,
    },
}

/// Per-repository result line.
enum Report {
    Done(String),
    Warning(String),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", style::status(Mark::Fail, &format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when at least one repository operation failed.
fn run(cli: Cli) -> Result<bool> {
    let ok = match cli.command {
        Commands::Init { output } => {
            init_logging(cli.verbose)?;
            cmd_init(&output)?;
            true
        }
        Commands::Validate => {
            init_logging(cli.verbose)?;
            cmd_validate(&cli.config)?;
            true
        }
        Commands::Clone { name } => {
            let config = load_config(&cli.config, cli.verbose)?;
            for_each_repo(select(&config, name.as_deref())?, "clone", clone_if_absent)
        }
        Commands::Pull { name } => {
            let config = load_config(&cli.config, cli.verbose)?;
            for_each_repo(select(&config, name.as_deref())?, "pull", pull)
        }
        Commands::Push { message, name } => {
            let config = load_config(&cli.config, cli.verbose)?;
            for_each_repo(select(&config, name.as_deref())?, "push", |sync| {
                let oid = sync.commit_and_push(&message)?;
                Ok(Report::Done(format!("pushed {}", short(&oid))))
            })
        }
        Commands::Head { name } => {
            let config = load_config(&cli.config, cli.verbose)?;
            for_each_repo(select(&config, name.as_deref())?, "head", head)
        }
        Commands::Sync { name } => {
            let config = load_config(&cli.config, cli.verbose)?;
            for_each_repo(select(&config, name.as_deref())?, "sync", |sync| {
                match sync.head() {
                    Err(GitError::RepositoryNotFound(_)) => clone_if_absent(sync),
                    _ => pull(sync),
                }
            })
        }
    };
    Ok(ok)
}

/// Load and validate the config, then install the logger it asks for.
fn load_config(path: &Path, verbose: bool) -> Result<AppConfig> {
    let config = AppConfig::load_and_validate(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    init_logging(verbose || config.logging.verbose)?;
    Ok(config)
}

fn init_logging(verbose: bool) -> Result<()> {
    logging::init_logger(verbose).context("failed to initialize logger")
}

// ---------------------------------------------------------------------------
// Repository helpers
// ---------------------------------------------------------------------------

fn select<'a>(config: &'a AppConfig, name: Option<&str>) -> Result<Vec<&'a RepositoryConfig>> {
    match name {
        Some(name) => config
            .repository(name)
            .map(|repo| vec![repo])
            .with_context(|| format!("no repository named '{name}' in configuration")),
        None => {
            if config.repositories.is_empty() {
                anyhow::bail!("no repositories configured");
            }
            Ok(config.repositories.iter().collect())
        }
    }
}

/// Run `op` on every repository, printing one line each. Failures do not
/// stop the remaining repositories.
fn for_each_repo<F>(repos: Vec<&RepositoryConfig>, action: &str, mut op: F) -> bool
where
    F: FnMut(&RepositorySync) -> Result<Report, GitError>,
{
    let mut all_ok = true;
    for repo in repos {
        let sync = repo.to_sync();
        info!(repository = %repo.name, path = %sync.local_path().display(), "{action}");
        match op(&sync) {
            Ok(Report::Done(msg)) => println!("{}", style::repo_line(Mark::Ok, &repo.name, &msg)),
            Ok(Report::Warning(msg)) => println!("{}", style::repo_line(Mark::Warn, &repo.name, &msg)),
            Err(e) => {
                all_ok = false;
                println!(
                    "{}",
                    style::repo_line(Mark::Fail, &repo.name, &format!("{action} failed: {e}"))
                );
            }
        }
    }
    all_ok
}

fn clone_if_absent(sync: &RepositorySync) -> Result<Report, GitError> {
    if sync.head().is_ok() {
        debug!(path = %sync.local_path().display(), "working copy present, skipping clone");
        return Ok(Report::Done("already cloned".into()));
    }
    sync.clone_repo()?;
    Ok(Report::Done(format!(
        "cloned {} at {}",
        sync.branch_name(),
        short(&sync.head_commit_id())
    )))
}

fn pull(sync: &RepositorySync) -> Result<Report, GitError> {
    Ok(match sync.pull()? {
        PullOutcome::Updated { from, to } => Report::Done(format!(
            "updated {}..{}",
            from.as_deref().map(short).unwrap_or("(none)"),
            short(&to)
        )),
        PullOutcome::AlreadyCurrent => Report::Done("already up to date".into()),
        PullOutcome::DivergedNonFastForward { local, remote } => Report::Warning(format!(
            "diverged from remote (local {}, remote {}), left unchanged",
            short(&local),
            short(&remote)
        )),
    })
}

fn head(sync: &RepositorySync) -> Result<Report, GitError> {
    Ok(match sync.head()? {
        HeadState::Commit(id) => Report::Done(id),
        HeadState::Unborn => Report::Warning("(none)".into()),
    })
}

fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn describe_credentials(source: &CredentialSource) -> String {
    match source {
        CredentialSource::HomeKey => "~/.ssh/id_rsa".into(),
        CredentialSource::KeyFile { path, passphrase } => format!(
            "{}{}",
            path.display(),
            if passphrase.is_some() { " (passphrase set)" } else { "" }
        ),
        CredentialSource::KeyMemory { .. } => "in-memory key".into(),
        CredentialSource::Agent => "ssh-agent".into(),
    }
}

fn describe_remote(kind: &RemoteKind) -> &'static str {
    match kind {
        RemoteKind::Ssh { .. } => "ssh",
        RemoteKind::Https => "https",
        RemoteKind::Local => "local",
        RemoteKind::Other => "other",
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# reposync configuration

logging:
  verbose: false

repositories:
  - name: example
    remote: git@github.com:owner/repo.git
    branch: main
    path: ~/reposync/example
    # ssh_key: ~/.ssh/deploy_key
    # ssh_key_passphrase_env: DEPLOY_KEY_PASSPHRASE
    # use_agent: true
    # author:
    #   name: Sync Bot
    #   email: sync-bot@example.com
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the repositories list with your remotes and paths");
    println!(
        "  2. Validate with: reposync validate --config {}",
        output.display()
    );
    println!("  3. Clone everything: reposync sync --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::status(Mark::Ok, "YAML structure is valid"));

    if let Err(e) = config.validate() {
        println!("  {}", style::status(Mark::Fail, &format!("Validation error: {e}")));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::status(Mark::Ok, "All required fields are valid"));

    println!();
    println!("{}", style::heading("Repositories:"));
    for repo in &config.repositories {
        let sync = repo.to_sync();
        let kind = RemoteKind::parse(&repo.remote);
        println!("  {}", style::heading(&repo.name));
        println!(
            "    remote      : {} {}",
            repo.remote,
            style::note(&format!("({})", describe_remote(&kind)))
        );
        println!("    branch      : {}", sync.branch_ref());
        println!("    path        : {}", sync.local_path().display());
        println!("    credentials : {}", describe_credentials(sync.credentials()));
        println!(
            "    working copy: {}",
            if sync.head().is_ok() { "present" } else { "absent" }
        );
        if !kind.is_ssh() {
            println!(
                "    {}",
                style::status(Mark::Warn, "remote is not SSH; the key is still loaded but not offered")
            );
        }
    }
    if config.repositories.is_empty() {
        println!("  {}", style::status(Mark::Warn, "no repositories configured"));
    }

    Ok(())
}
