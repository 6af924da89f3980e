//! Chart repository index
//!
//! Helm `index.yaml` format, validated the way `helm repo add` does before a
//! repository is accepted.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default)]
    pub api_version: String,

    /// When this index was generated
    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions by chart name, newest first
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

impl RepositoryIndex {
    /// Parse and validate an index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Parse and validate an index from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(RepoError::InvalidIndex {
                message: "index is empty".to_string(),
            });
        }

        let mut index: Self = serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })?;

        if index.api_version.is_empty() {
            return Err(RepoError::InvalidIndex {
                message: "no API version specified".to_string(),
            });
        }

        index.prune_invalid();
        index.sort_entries();
        Ok(index)
    }

    /// Drop chart versions missing a name or version
    fn prune_invalid(&mut self) {
        for (chart, versions) in self.entries.iter_mut() {
            versions.retain(|v| {
                let valid = !v.name.is_empty() && !v.version.is_empty();
                if !valid {
                    tracing::warn!(
                        "Skipping invalid entry for chart {:?} (version {:?})",
                        chart,
                        v.version
                    );
                }
                valid
            });
        }
        self.entries.retain(|_, versions| !versions.is_empty());
    }

    /// Order versions of every chart newest first
    fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(|a, b| compare_versions(b, a));
        }
    }

    /// List all chart names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

fn compare_versions(a: &ChartVersion, b: &ChartVersion) -> Ordering {
    match (a.parsed_version(), b.parsed_version()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.version.cmp(&b.version),
    }
}

/// Chart version in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// URLs to download the chart archive
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartVersion {
    /// Parse version as semver, tolerating a leading `v`
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> RepositoryIndex {
        let yaml = r#"
apiVersion: v1
generated: "2024-01-01T00:00:00Z"
entries:
  nginx:
    - name: nginx
      version: "14.0.0"
      appVersion: "1.24.0"
      urls:
        - https://example.com/charts/nginx-14.0.0.tgz
    - name: nginx
      version: "15.0.0"
      appVersion: "1.25.0"
      description: NGINX Open Source
      urls:
        - https://example.com/charts/nginx-15.0.0.tgz
      digest: "sha256:abc123"
    - name: nginx
      version: ""
  redis:
    - name: redis
      version: v17.0.0
      urls:
        - https://example.com/charts/redis-17.0.0.tgz
  broken:
    - version: "1.0.0"
"#;
        RepositoryIndex::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_parse_index() {
        let index = sample_index();
        assert_eq!(index.names(), vec!["nginx", "redis"]);
        assert_eq!(index.entries["nginx"].len(), 2);
    }

    #[test]
    fn test_sorted_newest_first() {
        let index = sample_index();
        let latest = &index.entries["nginx"][0];
        assert_eq!(latest.version, "15.0.0");
        assert_eq!(latest.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(
            index.entries["redis"][0].parsed_version(),
            Some(Version::new(17, 0, 0))
        );
    }

    #[test]
    fn test_missing_api_version() {
        let err = RepositoryIndex::from_yaml("entries: {}\n").unwrap_err();
        assert!(matches!(err, RepoError::InvalidIndex { .. }));
    }

    #[test]
    fn test_empty_index() {
        let err = RepositoryIndex::from_bytes(b"").unwrap_err();
        assert!(matches!(err, RepoError::InvalidIndex { .. }));
    }

    #[test]
    fn test_not_yaml() {
        let err = RepositoryIndex::from_bytes(b"<html>Not Found</html>").unwrap_err();
        assert!(matches!(err, RepoError::IndexParseError { .. }));
    }
}
