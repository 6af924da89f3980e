//! HTTP chart repository client
//!
//! Downloads and validates a repository's `index.yaml` and caches it next to
//! the other indexes as `<name>-index.yaml` plus a `<name>-charts.txt` listing.

use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::config::{Entry, write_atomic};
use crate::credentials::SecureHttpClient;
use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;

const CACHE_FILE_MODE: u32 = 0o644;

/// Cached index file for a repository
pub fn cache_index_file(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(format!("{}-index.yaml", name))
}

/// Cached chart list for a repository
pub fn cache_charts_file(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(format!("{}-charts.txt", name))
}

/// Client for one chart repository
pub struct ChartRepository {
    entry: Entry,
    client: SecureHttpClient,
}

impl ChartRepository {
    /// Create a client for an entry; only http(s) URLs are supported
    pub fn new(entry: Entry, timeout: Duration) -> Result<Self> {
        let url = Url::parse(&entry.url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: entry.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RepoError::InvalidRepositoryUrl {
                url: entry.url.clone(),
                reason: format!("could not find protocol handler for: {}", url.scheme()),
            });
        }

        let client = SecureHttpClient::for_entry(&entry, timeout)?;
        Ok(Self { entry, client })
    }

    /// Get the repository name
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Fetch and validate the index
    pub async fn fetch_index(&self) -> Result<RepositoryIndex> {
        let (_, index) = self.fetch_raw_index().await?;
        Ok(index)
    }

    /// Fetch, validate and cache the index; returns the cached index path
    pub async fn download_index_file(&self, cache_dir: &Path) -> Result<PathBuf> {
        let (raw, index) = self.fetch_raw_index().await?;

        std::fs::create_dir_all(cache_dir).map_err(|e| RepoError::storage(cache_dir, e))?;

        let mut charts = index.names().join("\n");
        charts.push('\n');
        write_atomic(
            &cache_charts_file(cache_dir, self.name()),
            charts.as_bytes(),
            CACHE_FILE_MODE,
        )?;

        let index_path = cache_index_file(cache_dir, self.name());
        write_atomic(&index_path, &raw, CACHE_FILE_MODE)?;

        tracing::info!(
            "Cached index of {} ({} charts) at {}",
            self.name(),
            index.entries.len(),
            index_path.display()
        );
        Ok(index_path)
    }

    async fn fetch_raw_index(&self) -> Result<(Vec<u8>, RepositoryIndex)> {
        let index_url = self.entry.index_url();
        tracing::debug!("Fetching {}", index_url);

        let raw = self.client.get_bytes(&index_url).await?;
        let index = RepositoryIndex::from_bytes(&raw)?;
        Ok((raw, index))
    }
}
