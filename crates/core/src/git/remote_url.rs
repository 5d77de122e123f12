//! Remote locator classification.
//!
//! Distinguishes SSH remotes (scp-like `user@host:path` and `ssh://` URLs)
//! from HTTPS and local remotes, and extracts the SSH login name when the
//! locator carries one.

/// Transport family of a remote locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteKind {
    /// SSH transport, with the login name if the locator names one.
    Ssh { user: Option<String> },
    /// HTTP(S) transport.
    Https,
    /// A filesystem path or `file://` URL.
    Local,
    /// Any other URL scheme, such as `git://`.
    Other,
}

impl RemoteKind {
    /// Classify a remote locator.
    ///
    /// Resolution order:
    /// 1. `ssh://[user@]host[:port]/path` and `git+ssh://` → `Ssh`
    /// 2. `http://` / `https://`            → `Https`
    /// 3. `file://`                           → `Local`
    /// 4. any other `scheme://`               → `Other`
    /// 5. scp-like `[user@]host:path`        → `Ssh`
    /// 6. anything else is a filesystem path → `Local`
    pub fn parse(remote: &str) -> Self {
        let remote = remote.trim();
        let lower = remote.to_ascii_lowercase();

        for scheme in ["ssh://", "git+ssh://", "ssh+git://"] {
            if lower.starts_with(scheme) {
                let authority = remote[scheme.len()..]
                    .split('/')
                    .next()
                    .unwrap_or_default();
                return RemoteKind::Ssh {
                    user: user_of(authority),
                };
            }
        }

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return RemoteKind::Https;
        }

        if lower.starts_with("file://") {
            return RemoteKind::Local;
        }
        if lower.contains("://") {
            return RemoteKind::Other;
        }

        // scp-like syntax: a colon before the first slash, and not a
        // Windows drive letter such as `C:\repo`.
        match remote.find(':') {
            Some(colon) if colon > 1 && !remote[..colon].contains('/') => RemoteKind::Ssh {
                user: user_of(&remote[..colon]),
            },
            _ => RemoteKind::Local,
        }
    }

    pub fn is_ssh(&self) -> bool {
        matches!(self, RemoteKind::Ssh { .. })
    }
}

/// SSH login name embedded in `remote`, if any.
pub fn ssh_username(remote: &str) -> Option<String> {
    match RemoteKind::parse(remote) {
        RemoteKind::Ssh { user } => user,
        _ => None,
    }
}

fn user_of(authority: &str) -> Option<String> {
    authority
        .rsplit_once('@')
        .map(|(user, _)| user)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scp_like() {
        assert_eq!(
            RemoteKind::parse("git@github.com:acme/project.git"),
            RemoteKind::Ssh {
                user: Some("git".into())
            }
        );
    }

    #[test]
    fn test_scp_like_without_user() {
        assert_eq!(
            RemoteKind::parse("github.com:acme/project.git"),
            RemoteKind::Ssh { user: None }
        );
    }

    #[test]
    fn test_ssh_url_with_port() {
        assert_eq!(
            RemoteKind::parse("ssh://deploy@git.internal.io:2222/team/repo.git"),
            RemoteKind::Ssh {
                user: Some("deploy".into())
            }
        );
    }

    #[test]
    fn test_ssh_scheme_case_insensitive() {
        assert!(RemoteKind::parse("SSH://git@host/repo").is_ssh());
    }

    #[test]
    fn test_https() {
        assert_eq!(
            RemoteKind::parse("https://github.com/acme/project.git"),
            RemoteKind::Https
        );
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(RemoteKind::parse("/srv/git/repo.git"), RemoteKind::Local);
        assert_eq!(RemoteKind::parse("file:///srv/git/repo.git"), RemoteKind::Local);
        assert_eq!(RemoteKind::parse("../relative/repo"), RemoteKind::Local);
        assert_eq!(RemoteKind::parse("C:\\repos\\project"), RemoteKind::Local);
    }

    #[test]
    fn test_other_scheme() {
        assert_eq!(RemoteKind::parse("git://example.org/repo.git"), RemoteKind::Other);
    }

    #[test]
    fn test_ssh_username() {
        assert_eq!(
            ssh_username("git@gitlab.com:group/repo.git").as_deref(),
            Some("git")
        );
        assert_eq!(ssh_username("https://user@github.com/acme/x.git"), None);
        assert_eq!(ssh_username("ssh://host/repo.git"), None);
    }
}
