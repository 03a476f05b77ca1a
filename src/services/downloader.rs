use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::SweepError;

const TEMP_SUBDIR: &str = "m3u-sweeper";

/// Resolves playlist sources: local paths are checked for existence, URLs are
/// downloaded into the OS temp directory.
pub struct SourceFetcher {
    client: Client,
    max_retries: u32,
}

impl SourceFetcher {
    pub fn new(client: Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    /// Turn a `-src` argument into a readable local file.
    pub async fn resolve(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, SweepError> {
        if let Ok(url) = Url::parse(source) {
            if matches!(url.scheme(), "http" | "https") {
                return self.download(&url, cancel).await;
            }
            if url.scheme().len() > 1 {
                // Single letters are Windows drive prefixes, not schemes.
                return Err(SweepError::InvalidSourceUrl {
                    url: source.to_string(),
                });
            }
        }

        let path = PathBuf::from(source);
        if !path.is_file() {
            return Err(SweepError::SourceNotFound {
                path: source.to_string(),
            });
        }
        Ok(path)
    }

    async fn download(&self, url: &Url, cancel: &CancellationToken) -> Result<PathBuf, SweepError> {
        info!(url = %url, "downloading source playlist");
        let mut last_err = String::from("no attempts made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis((1u64 << attempt).saturating_mul(500).min(10_000));
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying download");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(backoff) => {}
                }
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.client.get(url.clone()).send() => result,
            };
            match response {
                Ok(response) if response.status().is_success() => {
                    let bytes = response.bytes().await.map_err(|e| SweepError::DownloadFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
                    let path = temp_file_path(url);
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(|source| {
                            SweepError::SourceRead {
                                path: path.display().to_string(),
                                source,
                            }
                        })?;
                    }
                    tokio::fs::write(&path, &bytes).await.map_err(|source| {
                        SweepError::SourceRead {
                            path: path.display().to_string(),
                            source,
                        }
                    })?;
                    debug!(path = %path.display(), bytes = bytes.len(), "source downloaded");
                    return Ok(path);
                }
                Ok(response) => {
                    // HTTP errors are final; only transport failures retry.
                    return Err(SweepError::DownloadFailed {
                        url: url.to_string(),
                        reason: format!("HTTP {}", response.status()),
                    });
                }
                Err(err) => {
                    last_err = err.to_string();
                }
            }
        }

        Err(SweepError::DownloadFailed {
            url: url.to_string(),
            reason: last_err,
        })
    }
}

/// `<temp>/m3u-sweeper/<sanitized-origin>_<yyyy-MM-dd_HH-mm-ss>.m3u`
fn temp_file_path(url: &Url) -> PathBuf {
    let origin = format!("{}{}", url.host_str().unwrap_or("source"), url.path());
    let sanitized: String = origin
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    std::env::temp_dir()
        .join(TEMP_SUBDIR)
        .join(format!("{sanitized}_{stamp}.m3u"))
}

/// Read a playlist file and decode it by BOM, falling back to UTF-8.
pub fn read_playlist_text(path: &Path) -> Result<String, SweepError> {
    let bytes = std::fs::read(path).map_err(|source| SweepError::SourceRead {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decode_playlist_bytes(&bytes))
}

fn decode_playlist_bytes(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0x00, 0x00, 0xFE, 0xFF]) {
        return rest
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .filter_map(char::from_u32)
            .collect();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("#EXTM3U\n".as_bytes());
        assert_eq!(decode_playlist_bytes(&bytes), "#EXTM3U\n");
    }

    #[test]
    fn decodes_utf16_both_orders() {
        let text = "#EXTM3U\nÜbersicht";
        let mut le = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            le.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_playlist_bytes(&le), text);

        let mut be = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_playlist_bytes(&be), text);
    }

    #[test]
    fn decodes_utf32_be() {
        let text = "#EXTM3U";
        let mut bytes = vec![0x00, 0x00, 0xFE, 0xFF];
        for ch in text.chars() {
            bytes.extend_from_slice(&(ch as u32).to_be_bytes());
        }
        assert_eq!(decode_playlist_bytes(&bytes), text);
    }

    #[test]
    fn plain_bytes_fall_back_to_utf8() {
        assert_eq!(decode_playlist_bytes(b"#EXTM3U\n"), "#EXTM3U\n");
    }

    #[test]
    fn temp_file_name_carries_sanitized_origin() {
        let url = Url::parse("http://cdn.example.com/lists/main.m3u").unwrap();
        let path = temp_file_path(&url);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("cdn_example_com_lists_main_m3u_"));
        assert!(name.ends_with(".m3u"));
        assert!(path.parent().unwrap().ends_with(TEMP_SUBDIR));
    }

    #[tokio::test]
    async fn missing_file_is_source_not_found() {
        let fetcher = SourceFetcher::new(Client::new(), 0);
        let err = fetcher
            .resolve("/no/such/playlist.m3u", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid_url() {
        let fetcher = SourceFetcher::new(Client::new(), 0);
        let err = fetcher
            .resolve("ftp://host.example/list.m3u", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidSourceUrl { .. }));
    }
}
