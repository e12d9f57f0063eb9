//! Streaming HTTP downloads with progress reporting.

use std::path::{Path, PathBuf};

use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;

/// Progress callback receiving a percentage in `0..=100`.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Streams remote artifacts straight to disk.
///
/// No timeout is configured: a stalled server stalls the download.
#[derive(Debug, Clone, Default)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`, creating parent directories as needed.
    ///
    /// Progress is only reported when the server sends a content length.
    /// On any failure after the file was created, the partial file is removed
    /// before the error is returned.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            tracing::warn!("Download of {} failed with HTTP {}", url, status);
            return Err(DownloadError::Http { status });
        }

        let total = response.content_length().filter(|len| *len > 0);
        let file = File::create(dest).await.map_err(|source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        match write_body(response, file, dest, total, on_progress).await {
            Ok(received) => {
                tracing::debug!("Downloaded {} bytes to {}", received, dest.display());
                Ok(dest.to_path_buf())
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(dest).await {
                    tracing::debug!("Failed to remove partial download {}: {}", dest.display(), rm);
                }
                Err(e)
            }
        }
    }
}

async fn write_body(
    mut response: Response,
    mut file: File,
    dest: &Path,
    total: Option<u64>,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<u64, DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let mut received: u64 = 0;
    let mut last_reported: Option<u8> = None;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        received += chunk.len() as u64;

        if let (Some(total), Some(report)) = (total, on_progress) {
            let pct = percent(received, total);
            if last_reported != Some(pct) {
                last_reported = Some(pct);
                report(pct);
            }
        }
    }

    file.flush().await.map_err(io_err)?;
    Ok(received)
}

fn percent(received: u64, total: u64) -> u8 {
    let pct = (received as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
