//! Installer - download, verify and extract one tool version.
//!
//! Progress is reported on a single 0-100 scale: the download fills 0-70,
//! a successful extraction jumps straight to 100.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Serialize;

use super::checksum;
use super::download::{Downloader, ProgressFn};
use super::error::InstallError;
use super::extract;
use crate::paths::Paths;

/// Share of the overall progress bar taken by the download.
const DOWNLOAD_SHARE: f64 = 0.7;

/// Lifecycle of a single install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Downloading,
    Verifying,
    Extracting,
    Ready,
    Failed,
}

/// A tool version installed on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInstallation {
    pub name: String,
    pub version: String,
    pub install_dir: PathBuf,
    /// The downloaded artifact, kept next to the extracted files.
    pub artifact: PathBuf,
    /// False when no checksum was supplied; a mismatch fails the install.
    pub checksum_verified: bool,
}

impl ToolInstallation {
    /// Conventional executable location, relative to the bin root.
    ///
    /// The supervisor searches the install tree when this does not exist.
    pub fn default_executable(name: &str, version: &str) -> PathBuf {
        Path::new(name)
            .join(version)
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }
}

pub struct Installer {
    paths: Paths,
    downloader: Downloader,
}

impl Installer {
    pub fn new(paths: Paths, downloader: Downloader) -> Self {
        Self { paths, downloader }
    }

    /// Install `name@version` from `download_url`.
    ///
    /// A checksum mismatch leaves the artifact on disk for diagnostics.
    pub async fn install(
        &self,
        name: &str,
        version: &str,
        download_url: &str,
        checksum: Option<&str>,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<ToolInstallation, InstallError> {
        let file_name = artifact_name(download_url)?;
        let install_dir = self.paths.tool_dir(name, Some(version));
        let artifact = install_dir.join(&file_name);

        tokio::fs::create_dir_all(&install_dir).await?;

        let report = |pct: u8| {
            if let Some(cb) = on_progress {
                cb(pct);
            }
        };
        let report_download = |pct: u8| report(scale_download(pct));

        log_phase(name, version, InstallPhase::Downloading);
        self.downloader
            .download(download_url, &artifact, Some(&report_download))
            .await?;

        let checksum = checksum.map(str::trim).filter(|c| !c.is_empty());
        let checksum_verified = match checksum {
            Some(expected) => {
                log_phase(name, version, InstallPhase::Verifying);
                if !checksum::verify(&artifact, expected).await? {
                    log_phase(name, version, InstallPhase::Failed);
                    return Err(InstallError::Checksum { path: artifact });
                }
                true
            }
            None => false,
        };

        log_phase(name, version, InstallPhase::Extracting);
        if !extract::extract(&artifact, &install_dir).await {
            log_phase(name, version, InstallPhase::Failed);
            return Err(InstallError::Extraction { path: artifact });
        }
        report(100);

        for dir in [
            self.paths.config_dir(),
            self.paths.nginx_config_dir(),
            self.paths.php_config_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }

        log_phase(name, version, InstallPhase::Ready);
        Ok(ToolInstallation {
            name: name.to_string(),
            version: version.to_string(),
            install_dir,
            artifact,
            checksum_verified,
        })
    }

    /// Remove one installed version, or every version when `version` is `None`.
    ///
    /// Removing something that is not there is not an error.
    pub async fn uninstall(&self, name: &str, version: Option<&str>) -> std::io::Result<()> {
        let dir = self.paths.tool_dir(name, version);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!("Removed {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn log_phase(name: &str, version: &str, phase: InstallPhase) {
    tracing::info!(tool = name, version = version, phase = ?phase, "install phase");
}

/// Map download progress into the 0-70 band.
fn scale_download(pct: u8) -> u8 {
    (f64::from(pct) * DOWNLOAD_SHARE).round() as u8
}

/// Artifact file name: last path segment of the URL, query string dropped.
fn artifact_name(download_url: &str) -> Result<String, InstallError> {
    let url = Url::parse(download_url)
        .map_err(|e| InstallError::InvalidUrl(format!("{}: {}", download_url, e)))?;

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| InstallError::InvalidUrl(format!("{}: no file name in path", download_url)))
}
