//! Repository file management
//!
//! Reads and writes the Helm-compatible `repositories.yaml`: a flat, ordered
//! list of uniquely named repository entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::Path;

use crate::error::{RepoError, Result};

/// Permissions of the repository file (owner rw, group/other r)
pub const REPOSITORY_FILE_MODE: u32 = 0o644;

/// Repository file (`repositories.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFile {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When this file was first generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Configured repositories, in insertion order
    #[serde(default)]
    pub repositories: Vec<Entry>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryFile {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: Utc::now(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryFile {
    /// Load the repository file, treating a missing file as empty
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RepoError::storage(path, e)),
        };

        Self::from_bytes(&bytes).map_err(|e| RepoError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse a repository file from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let file: Self = serde_yaml::from_slice(bytes)?;
        Ok(file)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the whole file atomically with the given permissions
    pub fn write_file(&self, path: &Path, mode: u32) -> Result<()> {
        let content = self.to_yaml()?;
        write_atomic(path, content.as_bytes(), mode)
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Replace the entry with the same name in place, or append it
    pub fn update(&mut self, entry: Entry) {
        match self.repositories.iter_mut().find(|r| r.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.repositories.push(entry),
        }
    }

    /// List all repository names
    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Repository entry
///
/// Field names follow Helm's `repositories.yaml` so files can be shared with
/// the `helm` CLI. Empty strings read back as `None`. File paths are kept as
/// written and compared byte for byte, not as normalized paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique name for this repository
    pub name: String,

    /// Repository URL
    pub url: String,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,

    /// Client certificate (PEM)
    #[serde(
        rename = "certFile",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cert_file: Option<String>,

    /// Client key (PEM)
    #[serde(
        rename = "keyFile",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub key_file: Option<String>,

    /// CA bundle for TLS verification
    #[serde(
        rename = "caFile",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub ca_file: Option<String>,

    /// Skip TLS verification (insecure, not recommended)
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Send credentials to every host, even after a cross-origin redirect
    #[serde(default)]
    pub pass_credentials_all: bool,
}

impl Entry {
    /// Create an entry with no credentials or TLS options
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Get the index URL
    pub fn index_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        format!("{}/index.yaml", base)
    }

    /// Basic auth credentials, if a username is configured
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or_default()))
    }
}

fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(T::from))
}

/// Write bytes to `path` through a temp file in the same directory, then rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RepoError::storage(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RepoError::storage(tmp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(|e| RepoError::storage(tmp.path(), e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path)
        .map_err(|e| RepoError::storage(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_index_url() {
        let entry = Entry::new("bitnami", "https://charts.bitnami.com/bitnami/");
        assert_eq!(
            entry.index_url(),
            "https://charts.bitnami.com/bitnami/index.yaml"
        );
    }

    #[test]
    fn test_update_appends_and_replaces_in_place() {
        let mut file = RepositoryFile::default();
        file.update(Entry::new("a", "https://a.example.com"));
        file.update(Entry::new("b", "https://b.example.com"));
        file.update(Entry::new("a", "https://a2.example.com"));

        assert_eq!(file.names(), vec!["a", "b"]);
        assert_eq!(file.get("a").unwrap().url, "https://a2.example.com");
        assert!(file.get("b").is_some());
        assert!(file.get("c").is_none());
    }

    #[test]
    fn test_entry_equality_is_structural() {
        let a = Entry::new("stable", "https://charts.example.com");
        let mut b = a.clone();
        assert_eq!(a, b);

        b.insecure_skip_tls_verify = true;
        assert_ne!(a, b);
    }

    #[test]
    fn test_entry_paths_compare_as_written() {
        let a = Entry {
            ca_file: Some("/etc/ssl/ca.pem".to_string()),
            ..Entry::new("private", "https://charts.example.com")
        };
        let b = Entry {
            ca_file: Some("/etc/ssl//ca.pem/".to_string()),
            ..a.clone()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_missing_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = RepositoryFile::load(&dir.path().join("repositories.yaml")).unwrap();
        assert!(file.repositories.is_empty());
        assert_eq!(file.api_version, "v1");
    }

    #[test]
    fn test_load_empty_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.yaml");
        std::fs::write(&path, "\n").unwrap();

        let file = RepositoryFile::load(&path).unwrap();
        assert!(file.repositories.is_empty());
    }

    #[test]
    fn test_load_corrupted_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.yaml");
        std::fs::write(&path, "repositories: [this is: not: valid").unwrap();

        let err = RepositoryFile::load(&path).unwrap_err();
        assert!(matches!(err, RepoError::Format { .. }));
    }

    #[test]
    fn test_load_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepositoryFile::load(dir.path()).unwrap_err();
        assert!(matches!(err, RepoError::Storage { .. }));
    }

    #[test]
    fn test_parse_helm_written_file() {
        let yaml = r#"
apiVersion: ""
generated: "0001-01-01T00:00:00Z"
repositories:
- caFile: ""
  certFile: ""
  insecure_skip_tls_verify: false
  keyFile: ""
  name: stable
  pass_credentials_all: false
  password: ""
  url: https://charts.example.com/stable
  username: ""
- caFile: /etc/ssl/ca.pem
  name: private
  url: https://private.example.com
  username: admin
  password: s3cret
"#;
        let file = RepositoryFile::from_bytes(yaml.as_bytes()).unwrap();
        assert_eq!(file.names(), vec!["stable", "private"]);
        assert_eq!(
            file.get("stable").unwrap(),
            &Entry::new("stable", "https://charts.example.com/stable")
        );

        let private = file.get("private").unwrap();
        assert_eq!(private.ca_file.as_deref(), Some("/etc/ssl/ca.pem"));
        assert_eq!(private.basic_auth(), Some(("admin", "s3cret")));
    }

    #[test]
    fn test_write_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.yaml");

        let mut file = RepositoryFile::default();
        file.update(Entry::new("zeta", "https://zeta.example.com"));
        file.update(Entry {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            pass_credentials_all: true,
            ..Entry::new("alpha", "https://alpha.example.com")
        });
        file.write_file(&path, REPOSITORY_FILE_MODE).unwrap();

        let loaded = RepositoryFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert_eq!(loaded.names(), vec!["zeta", "alpha"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.yaml");
        RepositoryFile::default()
            .write_file(&path, REPOSITORY_FILE_MODE)
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
