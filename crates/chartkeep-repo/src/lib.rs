//! Chartkeep Repository Registration
//!
//! This crate registers Helm chart repositories in a shared
//! `repositories.yaml`, safely with respect to other writers:
//!
//! - **File locking**: every read-modify-write holds `<file>.lock`
//! - **Idempotent adds**: identical re-adds can succeed, conflicting ones never do
//! - **Validated entries**: a new repository is only written once its
//!   `index.yaml` downloads and parses
//! - **Helm compatible**: same repository file and index cache layout as `helm`
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartkeep_repo::{RepoAddOptions, Registrar, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registrar = Registrar::new(Settings::from_env()?);
//!
//! let opts = RepoAddOptions::new("bitnami", "https://charts.bitnami.com/bitnami")
//!     .allow_existing(true);
//! let outcome = registrar.add(&opts).await?;
//!
//! for diagnostic in &outcome.diagnostics {
//!     eprintln!("warning: {}", diagnostic);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Notes
//!
//! - The lock is advisory: it only excludes writers using this crate's protocol
//! - By default a lock timeout fails the add; `LockTimeoutPolicy::Proceed`
//!   continues unlocked and reports `Diagnostic::LockNotAcquired`
//! - Dropping an in-flight `add` releases the lock

pub mod error;
pub mod settings;
pub mod config;
pub mod filelock;
pub mod index;
pub mod credentials;
pub mod http;
pub mod backend;
pub mod registrar;

// Re-exports for convenience
pub use error::{RepoError, Result};
pub use settings::{LockTimeoutPolicy, Settings};
pub use config::{Entry, REPOSITORY_FILE_MODE, RepositoryFile};
pub use filelock::{FileLock, LockGuard, lock_path_for};
pub use index::{ChartVersion, RepositoryIndex};
pub use credentials::SecureHttpClient;
pub use http::ChartRepository;
pub use backend::{HttpBackend, IndexBackend};
pub use registrar::{AddOutcome, AddStatus, Diagnostic, Registrar, RepoAddOptions, UpdateReport};
