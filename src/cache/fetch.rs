//! Downloading content to the cache directory

use crate::config::schema::FetchConfig;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Outcome of a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Download {
    /// HTTP status code of the response
    pub status: u16,
    /// Bytes written to the destination (0 unless the status is a success)
    pub bytes_written: u64,
}

impl Download {
    /// Whether the status indicates success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network transfer collaborator
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `path`
    ///
    /// An `Err` means the transfer itself failed; a non-success status is
    /// reported through [`Download::status`] and leaves `path` untouched.
    async fn download_to(&self, url: &str, path: &Path) -> CacheResult<Download>;
}

/// HTTP(S) downloads with `ureq`, run on the blocking pool
///
/// The body is streamed into `<path>.part` and renamed over `path` once
/// complete, so a failed transfer never leaves a truncated cache file.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpFetcher {
    /// Build a fetcher from download settings
    pub fn new(config: &FetchConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            user_agent: config.user_agent.clone(),
        }
    }

    fn download_blocking(&self, url: &str, path: &Path) -> CacheResult<Download> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| CacheError::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Download rejected by server");
            return Ok(Download {
                status: status.as_u16(),
                bytes_written: 0,
            });
        }

        let part = part_path(path);
        let written = File::create(&part).and_then(|mut file| {
            let n = io::copy(&mut response.into_body().into_reader(), &mut file)?;
            file.sync_all()?;
            Ok(n)
        });

        let bytes_written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                return Err(CacheError::fetch(url, e.to_string()));
            }
        };

        std::fs::rename(&part, path)
            .map_err(|e| CacheError::io(format!("moving download into {}", path.display()), e))?;

        Ok(Download {
            status: status.as_u16(),
            bytes_written,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn download_to(&self, url: &str, path: &Path) -> CacheResult<Download> {
        let fetcher = self.clone();
        let url = url.to_string();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || fetcher.download_blocking(&url, &path))
            .await
            .map_err(|e| CacheError::Internal(format!("download task failed: {e}")))?
    }
}

/// Temporary sibling used while a download is in flight
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tempfile::TempDir;

    /// Serve exactly one canned HTTP response on a local port
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(response.as_bytes());
            }
        });

        format!("http://{addr}/photo.png")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            timeout_secs: 5,
            ..FetchConfig::default()
        })
    }

    #[test]
    fn success_range() {
        assert!(Download { status: 200, bytes_written: 1 }.is_success());
        assert!(Download { status: 204, bytes_written: 0 }.is_success());
        assert!(!Download { status: 404, bytes_written: 0 }.is_success());
    }

    #[tokio::test]
    async fn downloads_body_to_path() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");

        let download = fetcher().download_to(&url, &path).await.unwrap();

        assert_eq!(download, Download { status: 200, bytes_written: 5 });
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn error_status_writes_nothing() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");

        let download = fetcher().download_to(&url, &path).await.unwrap();

        assert_eq!(download.status, 404);
        assert!(!download.is_success());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let result = fetcher()
            .download_to(&format!("http://{addr}/x.png"), &dir.path().join("x.png"))
            .await;

        assert!(matches!(result, Err(CacheError::Fetch { .. })));
    }
}
