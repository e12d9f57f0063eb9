//! SHA-256 verification of downloaded artifacts.
//!
//! Catalog checksums look like `sha256:<hex>`. The prefix is informational;
//! the digest is always SHA-256 whatever the prefix says.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Stream `path` once and compare its digest with `expected`.
pub async fn verify(path: &Path, expected: &str) -> std::io::Result<bool> {
    let actual = sha256_file(path).await?;
    let matches = actual == strip_algorithm(expected);
    if !matches {
        tracing::warn!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    Ok(matches)
}

/// Lowercase hex SHA-256 of a file, read in fixed-size chunks.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Drop an `algo:` prefix, keeping the digest text.
fn strip_algorithm(expected: &str) -> &str {
    let expected = expected.trim();
    match expected.split_once(':') {
        Some((_, digest)) => digest,
        None => expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello world")
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_strip_algorithm() {
        assert_eq!(strip_algorithm("sha256:abc"), "abc");
        assert_eq!(strip_algorithm("md5:abc"), "abc");
        assert_eq!(strip_algorithm("abc"), "abc");
        assert_eq!(strip_algorithm("  sha256:abc  "), "abc");
    }

    #[tokio::test]
    async fn test_verify_matching_digest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("artifact.bin");
        std::fs::write(&file, b"hello world").unwrap();

        assert_eq!(sha256_file(&file).await.unwrap(), HELLO_SHA256);
        assert!(verify(&file, HELLO_SHA256).await.unwrap());
        assert!(verify(&file, &format!("sha256:{}", HELLO_SHA256)).await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_does_not_select_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("artifact.bin");
        std::fs::write(&file, b"hello world").unwrap();

        // Still compared against SHA-256.
        assert!(verify(&file, &format!("sha512:{}", HELLO_SHA256)).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_byte_change_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("artifact.bin");
        let mut data = vec![0u8; 200_000];
        std::fs::write(&file, &data).unwrap();
        let digest = sha256_file(&file).await.unwrap();
        assert!(verify(&file, &digest).await.unwrap());

        data[150_000] = 1;
        std::fs::write(&file, &data).unwrap();
        assert!(!verify(&file, &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify(&dir.path().join("nope"), HELLO_SHA256).await.is_err());
    }
}
