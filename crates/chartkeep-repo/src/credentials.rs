//! HTTP client carrying a repository entry's credentials and TLS material
//!
//! Key security features:
//! - Basic auth is only sent to the origin of the requested URL
//! - Credentials cross a redirect to another origin only with `pass_credentials_all`
//! - Client certificates, custom CA bundles and insecure mode come from the entry

use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::Entry;
use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}

/// Basic auth header value
fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{}:{}", username, password),
    );
    format!("Basic {}", encoded)
}

/// Secure HTTP client wrapper with redirect protection
pub struct SecureHttpClient {
    client: reqwest::Client,
    auth_header: Option<String>,
    pass_credentials_all: bool,
    timeout: Duration,
}

impl SecureHttpClient {
    /// Build a client from an entry's credentials and TLS options
    pub fn for_entry(entry: &Entry, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            // Redirects are followed by hand so credentials can be dropped
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("chartkeep/", env!("CARGO_PKG_VERSION")));

        if let Some(ca_file) = &entry.ca_file {
            let pem = read_pem(Path::new(ca_file))?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| RepoError::TlsConfig {
                message: format!("{}: {}", ca_file, e),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        match (&entry.cert_file, &entry.key_file) {
            (Some(cert_file), Some(key_file)) => {
                let mut pem = read_pem(Path::new(cert_file))?;
                pem.push(b'\n');
                pem.extend(read_pem(Path::new(key_file))?);
                let identity =
                    reqwest::Identity::from_pem(&pem).map_err(|e| RepoError::TlsConfig {
                        message: format!("{} / {}: {}", cert_file, key_file, e),
                    })?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(RepoError::TlsConfig {
                    message: "certFile and keyFile must be set together".to_string(),
                });
            }
        }

        if entry.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| RepoError::TlsConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            auth_header: entry
                .basic_auth()
                .map(|(user, pass)| basic_auth_header(user, pass)),
            pass_credentials_all: entry.pass_credentials_all,
            timeout,
        })
    }

    /// Fetch a URL, following redirects by hand
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if let Some(auth) = &self.auth_header {
                if self.pass_credentials_all || same_origin(url, &current_url) {
                    request = request.header("Authorization", auth);
                } else {
                    tracing::warn!(
                        "Cross-origin redirect from {} to {} - credentials not forwarded",
                        url,
                        current_url
                    );
                }
            }

            let response = request.send().await.map_err(|e| self.send_error(e))?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                current_url = Url::parse(&current_url)
                    .and_then(|base| base.join(location))
                    .map_err(|e| RepoError::InvalidRepositoryUrl {
                        url: format!("{} (redirect to {:?})", current_url, location),
                        reason: e.to_string(),
                    })?
                    .to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| self.send_error(e))?;
        Ok(bytes.to_vec())
    }

    fn send_error(&self, e: reqwest::Error) -> RepoError {
        if e.is_timeout() {
            RepoError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            RepoError::from(e)
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| RepoError::TlsConfig {
        message: format!("can't read {}: {}", path.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin() {
        assert!(same_origin("https://example.com/foo", "https://example.com/bar"));
        assert!(same_origin(
            "https://example.com:443/foo",
            "https://example.com/bar"
        ));
        assert!(!same_origin("https://example.com/foo", "https://other.com/bar"));
        assert!(!same_origin("https://example.com/foo", "http://example.com/bar"));
        assert!(!same_origin(
            "https://example.com/foo",
            "https://example.com:8443/bar"
        ));
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_missing_ca_file() {
        let entry = Entry {
            ca_file: Some("/nonexistent/ca.pem".to_string()),
            ..Entry::new("private", "https://charts.example.com")
        };
        let err = SecureHttpClient::for_entry(&entry, Duration::from_secs(5)).err();
        assert!(matches!(err, Some(RepoError::TlsConfig { .. })));
    }

    #[test]
    fn test_cert_without_key() {
        let entry = Entry {
            cert_file: Some("/etc/ssl/client.pem".to_string()),
            ..Entry::new("private", "https://charts.example.com")
        };
        let err = SecureHttpClient::for_entry(&entry, Duration::from_secs(5)).err();
        assert!(matches!(err, Some(RepoError::TlsConfig { .. })));
    }

    #[test]
    fn test_insecure_client_builds() {
        let entry = Entry {
            insecure_skip_tls_verify: true,
            username: Some("user".to_string()),
            ..Entry::new("private", "https://charts.example.com")
        };
        let client = SecureHttpClient::for_entry(&entry, Duration::from_secs(5)).unwrap();
        assert_eq!(client.auth_header.as_deref(), Some("Basic dXNlcjo="));
    }
}
