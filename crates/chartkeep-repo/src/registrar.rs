//! Repository registration
//!
//! `Registrar::add` merges one entry into `repositories.yaml` under an
//! exclusive file lock:
//!
//! 1. reject names containing `/`
//! 2. create the parent directory and take `<file>.lock`
//! 3. load the repository file (missing = empty)
//! 4. same name, same config: optional refresh, then `allow_existing` or
//!    `DuplicateEntry`. Same name, different config: always `NameConflict`
//! 5. new name: the index must download and validate before anything is written
//! 6. write the whole file atomically and release the lock

use futures::future::join_all;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{HttpBackend, IndexBackend};
use crate::config::{Entry, REPOSITORY_FILE_MODE, RepositoryFile};
use crate::error::{RepoError, Result};
use crate::filelock::{FileLock, LockGuard};
use crate::settings::{LockTimeoutPolicy, Settings};

/// Options for adding a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoAddOptions {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pass_credentials_all: bool,

    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
    pub insecure_skip_tls_verify: bool,

    /// Succeed when an identical entry already exists
    pub allow_existing: bool,
    /// Refresh the index when an identical entry already exists
    pub refresh_on_existing: bool,
}

impl RepoAddOptions {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ca_file(mut self, ca_file: impl Into<String>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }

    pub fn with_client_cert(mut self, cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn pass_credentials_all(mut self, yes: bool) -> Self {
        self.pass_credentials_all = yes;
        self
    }

    pub fn insecure_skip_tls_verify(mut self, yes: bool) -> Self {
        self.insecure_skip_tls_verify = yes;
        self
    }

    pub fn allow_existing(mut self, yes: bool) -> Self {
        self.allow_existing = yes;
        self
    }

    pub fn refresh_on_existing(mut self, yes: bool) -> Self {
        self.refresh_on_existing = yes;
        self
    }

    /// The entry these options describe
    ///
    /// Empty strings are treated as unset, matching how entries are read back.
    pub fn entry(&self) -> Entry {
        fn non_empty(s: &Option<String>) -> Option<String> {
            s.clone().filter(|s| !s.is_empty())
        }

        Entry {
            name: self.name.clone(),
            url: self.url.clone(),
            username: non_empty(&self.username),
            password: non_empty(&self.password),
            cert_file: non_empty(&self.cert_file),
            key_file: non_empty(&self.key_file),
            ca_file: non_empty(&self.ca_file),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            pass_credentials_all: self.pass_credentials_all,
        }
    }
}

/// What an add did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    /// The entry was validated and written
    Added,
    /// An identical entry was already registered; nothing was written
    AlreadyExists,
}

/// Non-fatal problem observed during an add
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The lock timed out and the add ran without it
    LockNotAcquired { path: PathBuf },
    /// The lock could not be released
    UnlockFailed { path: PathBuf, message: String },
    /// Refreshing an existing repository failed
    RefreshFailed { name: String, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::LockNotAcquired { path } => {
                write!(f, "proceeded without lock {}", path.display())
            }
            Diagnostic::UnlockFailed { path, message } => {
                write!(f, "failed to unlock {}: {}", path.display(), message)
            }
            Diagnostic::RefreshFailed { name, message } => {
                write!(f, "failed to update repository {}: {}", name, message)
            }
        }
    }
}

/// Result of a successful add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub status: AddStatus,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of a successful update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Names of the refreshed repositories
    pub updated: Vec<String>,
}

/// Adds and refreshes repositories in a shared repository file
#[derive(Clone)]
pub struct Registrar {
    settings: Settings,
    backend: Arc<dyn IndexBackend>,
}

impl Registrar {
    /// Registrar validating indexes over HTTP(S)
    pub fn new(settings: Settings) -> Self {
        let backend = Arc::new(HttpBackend::new(settings.http_timeout));
        Self { settings, backend }
    }

    pub fn with_backend(settings: Settings, backend: Arc<dyn IndexBackend>) -> Self {
        Self { settings, backend }
    }

    /// Add a repository
    pub async fn add(&self, opts: &RepoAddOptions) -> Result<AddOutcome> {
        if opts.name.contains('/') {
            return Err(RepoError::InvalidName {
                name: opts.name.clone(),
            });
        }

        let repo_file = &self.settings.repository_config;
        if let Some(parent) = repo_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RepoError::storage(parent, e))?;
        }

        let mut diagnostics = Vec::new();
        let guard = self.acquire_lock(&mut diagnostics).await?;

        let result = self.add_locked(opts, &mut diagnostics).await;

        if let Some(guard) = guard {
            let path = guard.path().to_path_buf();
            if let Err(e) = guard.release() {
                tracing::warn!("Failed to unlock {}: {}", path.display(), e);
                diagnostics.push(Diagnostic::UnlockFailed {
                    path,
                    message: e.to_string(),
                });
            }
        }

        let status = result?;
        Ok(AddOutcome {
            status,
            diagnostics,
        })
    }

    /// Refresh the cached index of the named repositories (all when empty)
    pub async fn update(&self, names: &[&str]) -> Result<UpdateReport> {
        let file = RepositoryFile::load(&self.settings.repository_config)?;

        let entries: Vec<Entry> = if names.is_empty() {
            file.repositories.clone()
        } else {
            names
                .iter()
                .map(|name| {
                    file.get(name)
                        .cloned()
                        .ok_or_else(|| RepoError::RepositoryNotFound {
                            name: name.to_string(),
                        })
                })
                .collect::<Result<_>>()?
        };

        let cache_dir = &self.settings.repository_cache;
        let results = join_all(entries.iter().map(|entry| async move {
            let result = self.backend.download_index(entry, cache_dir).await;
            (entry.name.clone(), result)
        }))
        .await;

        let mut report = UpdateReport::default();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(_) => {
                    tracing::info!("Successfully got an update from the \"{}\" chart repository", name);
                    report.updated.push(name);
                }
                Err(e) => failures.push(format!("  {}: {}", name, e)),
            }
        }

        if !failures.is_empty() {
            return Err(RepoError::UpdateFailed {
                failures: failures.join("\n"),
            });
        }
        Ok(report)
    }

    async fn acquire_lock(&self, diagnostics: &mut Vec<Diagnostic>) -> Result<Option<LockGuard>> {
        let lock = FileLock::for_file(&self.settings.repository_config);

        match lock
            .lock_with_timeout(self.settings.lock_timeout, self.settings.lock_poll_interval)
            .await
        {
            Ok(guard) => Ok(Some(guard)),
            Err(RepoError::LockTimeout { path, seconds })
                if self.settings.lock_timeout_policy == LockTimeoutPolicy::Proceed =>
            {
                tracing::warn!(
                    "Could not lock {} within {}s, continuing without it",
                    path.display(),
                    seconds
                );
                diagnostics.push(Diagnostic::LockNotAcquired { path });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn add_locked(
        &self,
        opts: &RepoAddOptions,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<AddStatus> {
        let repo_file = &self.settings.repository_config;
        let mut file = RepositoryFile::load(repo_file)?;
        let entry = opts.entry();

        if let Some(existing) = file.get(&entry.name) {
            if existing != &entry {
                return Err(RepoError::NameConflict { name: entry.name });
            }

            if opts.refresh_on_existing {
                if let Err(e) = self.update(&[entry.name.as_str()]).await {
                    tracing::warn!("Failed to update repository {}: {}", entry.name, e);
                    diagnostics.push(Diagnostic::RefreshFailed {
                        name: entry.name.clone(),
                        message: e.to_string(),
                    });
                }
            }

            if opts.allow_existing {
                return Ok(AddStatus::AlreadyExists);
            }
            return Err(RepoError::DuplicateEntry { name: entry.name });
        }

        self.backend
            .download_index(&entry, &self.settings.repository_cache)
            .await
            .map_err(|e| RepoError::RepositoryUnreachable {
                url: entry.url.clone(),
                source: Box::new(e),
            })?;

        let name = entry.name.clone();
        file.update(entry);
        file.write_file(repo_file, REPOSITORY_FILE_MODE)?;

        tracing::info!("\"{}\" has been added to your repositories", name);
        Ok(AddStatus::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_to_entry() {
        let opts = RepoAddOptions::new("private", "https://charts.example.com")
            .with_basic_auth("admin", "")
            .with_ca_file("/etc/ssl/ca.pem")
            .pass_credentials_all(true)
            .allow_existing(true);

        let entry = opts.entry();
        assert_eq!(entry.name, "private");
        assert_eq!(entry.username.as_deref(), Some("admin"));
        assert_eq!(entry.password, None);
        assert_eq!(entry.ca_file.as_deref(), Some("/etc/ssl/ca.pem"));
        assert!(entry.pass_credentials_all);
        assert!(!entry.insecure_skip_tls_verify);
    }

    #[test]
    fn test_options_without_extras_match_plain_entry() {
        let opts = RepoAddOptions::new("stable", "https://charts.example.com")
            .allow_existing(true)
            .refresh_on_existing(true);
        assert_eq!(opts.entry(), Entry::new("stable", "https://charts.example.com"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::RefreshFailed {
            name: "stable".to_string(),
            message: "Network error: Connection failed".to_string(),
        };
        assert_eq!(
            diag.to_string(),
            "failed to update repository stable: Network error: Connection failed"
        );
    }
}
