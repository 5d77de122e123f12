//! YAML-based configuration loading.
//!
//! [`load_yaml_file`] decodes any `serde` type from a YAML file. The
//! [`AppConfig`] type describes the repository bindings driven by the
//! `reposync` command-line tool.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::git::{CommitAuthor, CredentialSource, RepositorySync};

// ---------------------------------------------------------------------------
// Generic loader
// ---------------------------------------------------------------------------

/// Read `path` and decode its YAML contents into `T`.
///
/// Fields missing from the file take their `#[serde(default)]` values, so a
/// destination type with defaults behaves like a pre-filled structure that
/// the file overrides.
pub fn load_yaml_file<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!(path = %path.display(), "reading yaml file");

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Overlay the YAML contents of `path` onto an already populated `config`.
///
/// Keys present in the file replace the current values, nested mappings are
/// merged key by key, and everything the file leaves out keeps its current
/// value. On error `config` is left untouched.
pub fn load_yaml_file_into<T, P>(config: &mut T, path: P) -> Result<(), ConfigError>
where
    T: Serialize + DeserializeOwned,
    P: AsRef<Path>,
{
    let overlay: serde_yaml::Value = load_yaml_file(path)?;
    let mut merged =
        serde_yaml::to_value(&*config).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    merge_yaml(&mut merged, overlay);
    *config = serde_yaml::from_value(merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Ok(())
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        // An empty document overlays nothing.
        (_, serde_yaml::Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration of the `reposync` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logger settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Working copies to keep in sync.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// Logger settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Debug level, timestamps and call sites when `true`.
    #[serde(default)]
    pub verbose: bool,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// One remote branch bound to one local working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Unique name used to select the repository on the command line.
    pub name: String,

    /// Clone URL or remote locator.
    pub remote: String,

    /// Branch to track (default `main`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Location of the working copy.
    pub path: PathBuf,

    /// Private key to authenticate with. Defaults to `~/.ssh/id_rsa`.
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,

    /// Environment variable holding the passphrase for `ssh_key`.
    #[serde(default)]
    pub ssh_key_passphrase_env: Option<String>,

    /// Authenticate through a running ssh-agent instead of a key file.
    #[serde(default)]
    pub use_agent: bool,

    /// Identity for commits. Falls back to the repository's git config.
    #[serde(default)]
    pub author: Option<AuthorConfig>,
}

/// Commit identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

fn default_branch() -> String {
    "main".into()
}

impl RepositoryConfig {
    /// Credential source described by this entry.
    ///
    /// A passphrase variable that is unset or empty logs a warning and the
    /// key is used without a passphrase.
    pub fn credential_source(&self) -> CredentialSource {
        if self.use_agent {
            return CredentialSource::Agent;
        }
        match &self.ssh_key {
            Some(path) => CredentialSource::KeyFile {
                path: expand_home(path),
                passphrase: self
                    .ssh_key_passphrase_env
                    .as_deref()
                    .and_then(|env_name| resolve_optional_env(env_name, &self.name)),
            },
            None => CredentialSource::HomeKey,
        }
    }

    /// Build the [`RepositorySync`] binding for this entry.
    pub fn to_sync(&self) -> RepositorySync {
        let sync = RepositorySync::new(&self.remote, &self.branch, expand_home(&self.path))
            .with_credentials(self.credential_source());
        match &self.author {
            Some(author) => sync.with_author(CommitAuthor {
                name: author.name.clone(),
                email: author.email.clone(),
            }),
            None => sync,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a YAML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");
        let config: AppConfig = load_yaml_file(path)?;
        debug!(
            repositories = config.repositories.len(),
            "configuration parsed successfully"
        );
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (i, repo) in self.repositories.iter().enumerate() {
            let field = |name: &str| format!("repositories[{i}].{name}");

            if repo.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field("name"),
                    detail: "name must not be empty".into(),
                });
            }
            if !names.insert(repo.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: field("name"),
                    detail: format!("duplicate repository name '{}'", repo.name),
                });
            }
            if repo.remote.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field("remote"),
                    detail: "remote must not be empty".into(),
                });
            }
            if repo.branch.trim().is_empty() || repo.branch.starts_with("refs/") {
                return Err(ConfigError::InvalidValue {
                    field: field("branch"),
                    detail: "branch must be a short branch name such as 'main'".into(),
                });
            }
            if repo.path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field("path"),
                    detail: "path must not be empty".into(),
                });
            }
            if repo.use_agent && repo.ssh_key.is_some() {
                return Err(ConfigError::InvalidValue {
                    field: field("ssh_key"),
                    detail: "ssh_key and use_agent are mutually exclusive".into(),
                });
            }
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a repository entry by name.
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, repository: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(repository, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(repository, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(repository, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_yaml() -> &'static str {
        r#"
logging:
  verbose: true

repositories:
  - name: docs
    remote: git@github.com:acme/docs.git
    branch: production
    path: /var/lib/reposync/docs
    ssh_key: /etc/reposync/deploy_key
    ssh_key_passphrase_env: DOCS_KEY_PASSPHRASE
    author:
      name: Docs Bot
      email: docs-bot@example.com
  - name: infra
    remote: ssh://deploy@git.internal.io:2222/ops/infra.git
    path: /var/lib/reposync/infra
    use_agent: true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = serde_yaml::from_str(sample_yaml()).expect("failed to parse yaml");
        assert!(config.logging.verbose);
        assert_eq!(config.repositories.len(), 2);

        let docs = config.repository("docs").unwrap();
        assert_eq!(docs.branch, "production");
        assert_eq!(docs.author.as_ref().unwrap().name, "Docs Bot");

        let infra = config.repository("infra").unwrap();
        assert_eq!(infra.branch, "main");
        assert!(infra.use_agent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reposync.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_yaml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.repositories[0].name, "docs");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/reposync.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "repositories: [\n  - name: x\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong.yaml");
        std::fs::write(&path, "repositories: 42\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Custom {
        endpoint: String,
        #[serde(default = "default_retries")]
        retries: u32,
    }

    fn default_retries() -> u32 {
        3
    }

    #[test]
    fn test_generic_loader_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "endpoint: https://example.com\n").unwrap();

        let custom: Custom = load_yaml_file(&path).unwrap();
        assert_eq!(
            custom,
            Custom {
                endpoint: "https://example.com".into(),
                retries: 3,
            }
        );
    }

    #[test]
    fn test_overlay_keeps_prefilled_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.yaml");
        std::fs::write(&path, "logging:\n  verbose: true\n").unwrap();

        let mut config = AppConfig {
            repositories: vec![RepositoryConfig {
                name: "docs".into(),
                remote: "git@example.com:acme/docs.git".into(),
                branch: "main".into(),
                path: PathBuf::from("/srv/docs"),
                ssh_key: None,
                ssh_key_passphrase_env: None,
                use_agent: true,
                author: None,
            }],
            ..AppConfig::default()
        };
        load_yaml_file_into(&mut config, &path).unwrap();

        assert!(config.logging.verbose);
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].name, "docs");
        assert!(config.repositories[0].use_agent);
    }

    #[test]
    fn test_overlay_failure_leaves_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "logging:\n  verbose: [not, a, bool]\n").unwrap();

        let mut config = AppConfig::default();
        config.logging.verbose = true;
        let err = load_yaml_file_into(&mut config, &path).unwrap_err();

        assert!(matches!(err, ConfigError::ParseError(_)));
        assert!(config.logging.verbose);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "{}\n").unwrap();
        let config = AppConfig::load_from_file(&path).unwrap();
        assert!(!config.logging.verbose);
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config: AppConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.repositories[1].name = "docs".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "repositories[1].name"
        ));
    }

    #[test]
    fn test_validate_rejects_full_ref_as_branch() {
        let mut config: AppConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.repositories[0].branch = "refs/heads/main".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "repositories[0].branch"
        ));
    }

    #[test]
    fn test_validate_rejects_key_with_agent() {
        let mut config: AppConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.repositories[0].use_agent = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "repositories[0].ssh_key"
        ));
    }

    #[test]
    fn test_credential_source_selection() {
        let config: AppConfig = serde_yaml::from_str(sample_yaml()).unwrap();

        let docs = config.repository("docs").unwrap();
        match docs.credential_source() {
            CredentialSource::KeyFile { path, .. } => {
                assert_eq!(path, PathBuf::from("/etc/reposync/deploy_key"))
            }
            other => panic!("unexpected source: {other:?}"),
        }

        let infra = config.repository("infra").unwrap();
        assert_eq!(infra.credential_source(), CredentialSource::Agent);

        let mut plain = docs.clone();
        plain.ssh_key = None;
        assert_eq!(plain.credential_source(), CredentialSource::HomeKey);
    }

    #[test]
    fn test_to_sync_binding() {
        let config: AppConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        let sync = config.repository("docs").unwrap().to_sync();
        assert_eq!(sync.remote(), "git@github.com:acme/docs.git");
        assert_eq!(sync.branch_ref(), "refs/heads/production");
        assert_eq!(sync.local_path(), Path::new("/var/lib/reposync/docs"));
    }

    #[test]
    fn test_expand_home() {
        let absolute = Path::new("/srv/wc");
        assert_eq!(expand_home(absolute), PathBuf::from("/srv/wc"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/wc")), home.join("wc"));
        }
    }
}
