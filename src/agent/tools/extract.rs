//! Staged archive extraction.
//!
//! Artifacts are unpacked into a fresh staging directory next to the install
//! directory, then the staged top-level entries are moved into place. Rename
//! is tried first; a recursive copy is the fallback when rename fails.
//!
//! Transient failures (a scanner or another process briefly holding a file)
//! are absorbed by re-running the whole stage-and-move sequence a fixed number
//! of times with linear backoff.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use zip::ZipArchive;

/// Stage-and-move attempts before giving up.
pub const EXTRACT_ATTEMPTS: u32 = 3;

/// Backoff grows by this much per failed attempt.
const BACKOFF_STEP: Duration = Duration::from_millis(250);

const STAGING_PREFIX: &str = ".devsetup-extract-";

/// How an artifact is unpacked, decided by file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Zip,
    TarGz,
    /// Not an archive; placed into the destination as-is.
    Opaque,
}

impl ArtifactKind {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            Self::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Opaque
        }
    }
}

/// Extract `archive` into `dest`, returning whether it eventually succeeded.
pub async fn extract(archive: &Path, dest: &Path) -> bool {
    for attempt in 1..=EXTRACT_ATTEMPTS {
        let src = archive.to_path_buf();
        let dst = dest.to_path_buf();

        match tokio::task::spawn_blocking(move || stage_and_move(&src, &dst)).await {
            Ok(Ok(())) => {
                tracing::info!("Extracted {} into {}", archive.display(), dest.display());
                return true;
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Extraction attempt {}/{} for {} failed: {}",
                    attempt,
                    EXTRACT_ATTEMPTS,
                    archive.display(),
                    e
                );
            }
            Err(e) => {
                tracing::warn!("Extraction task for {} panicked: {}", archive.display(), e);
            }
        }

        if attempt < EXTRACT_ATTEMPTS {
            tokio::time::sleep(BACKOFF_STEP * attempt).await;
        }
    }

    tracing::error!(
        "Giving up extracting {} after {} attempts",
        archive.display(),
        EXTRACT_ATTEMPTS
    );
    false
}

fn stage_and_move(archive: &Path, dest: &Path) -> io::Result<()> {
    let staging_root = dest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&staging_root)?;

    // Removed on drop, whatever happens below.
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&staging_root)?;

    unpack(archive, staging.path())?;

    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(staging.path())? {
        let entry = entry?;
        move_entry(&entry.path(), &dest.join(entry.file_name()))?;
    }

    Ok(())
}

fn unpack(archive: &Path, staging: &Path) -> io::Result<()> {
    match ArtifactKind::detect(archive) {
        ArtifactKind::Zip => {
            let file = fs::File::open(archive)?;
            let mut zip = ZipArchive::new(file).map_err(io::Error::other)?;
            zip.extract(staging).map_err(io::Error::other)?;
        }
        ArtifactKind::TarGz => {
            let file = fs::File::open(archive)?;
            tar::Archive::new(GzDecoder::new(file)).unpack(staging)?;
        }
        ArtifactKind::Opaque => {
            let name = archive.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "artifact has no file name")
            })?;
            let target = staging.join(name);
            fs::copy(archive, &target)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
            }
        }
    }
    Ok(())
}

/// Move one staged entry to `dst`, replacing whatever is there.
fn move_entry(src: &Path, dst: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::symlink_metadata(dst) {
        if meta.is_dir() {
            fs::remove_dir_all(dst)?;
        } else {
            fs::remove_file(dst)?;
        }
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(
                "Rename {} -> {} failed ({}), copying instead",
                src.display(),
                dst.display(),
                e
            );
            copy_recursive(src, dst)
        }
    }
}

fn copy_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    let mut stack: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        fs::create_dir_all(&to)?;
        for entry in fs::read_dir(&from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                stack.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), target)?;
            }
        }
    }
    Ok(())
}
