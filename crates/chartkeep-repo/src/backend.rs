//! Index backend trait
//!
//! The registrar validates and refreshes repositories through this seam, so
//! the HTTP client can be swapped for an in-memory one.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Entry;
use crate::error::Result;
use crate::http::ChartRepository;

/// Downloads a repository index into the cache
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Fetch and validate the entry's index, cache it, and return the cached path
    async fn download_index(&self, entry: &Entry, cache_dir: &Path) -> Result<PathBuf>;
}

/// HTTP(S) backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl IndexBackend for HttpBackend {
    async fn download_index(&self, entry: &Entry, cache_dir: &Path) -> Result<PathBuf> {
        let repo = ChartRepository::new(entry.clone(), self.timeout)?;
        repo.download_index_file(cache_dir).await
    }
}
