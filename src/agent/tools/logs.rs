//! Per-tool process logs.
//!
//! The append-only file under `Log/<tool>.log` is the durable record. While a
//! process runs, its supervisor also keeps a bounded in-memory tail.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Upper bound for the in-memory tail and for any log read.
pub const MAX_LOG_LINES: usize = 500;

#[derive(Debug)]
struct TailLine {
    text: String,
    persisted: bool,
}

/// Ring buffer of the most recent lines of one process lifetime.
#[derive(Debug, Default)]
pub struct LogTail {
    lines: VecDeque<TailLine>,
}

impl LogTail {
    pub fn push(&mut self, text: String, persisted: bool) {
        if self.lines.len() >= MAX_LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(TailLine { text, persisted });
    }

    /// Lines whose file append failed; the file already holds the rest.
    fn unpersisted(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| !l.persisted)
            .map(|l| l.text.as_str())
    }
}

/// File-backed log directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, tool: &str) -> PathBuf {
        self.dir.join(format!("{}.log", tool))
    }

    /// Append one newline-terminated line. Returns whether it reached the file.
    ///
    /// Not fsync'd; a crash can lose the last line.
    pub async fn append(&self, tool: &str, line: &str) -> bool {
        match self.try_append(&self.path(tool), line).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to append log for {}: {}", tool, e);
                false
            }
        }
    }

    async fn try_append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }

    /// Last `limit` non-empty lines of the tool's log file.
    pub async fn read_tail(&self, tool: &str, limit: usize) -> Vec<String> {
        let raw = match tokio::fs::read(self.path(tool)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read log for {}: {}", tool, e);
                return Vec::new();
            }
        };

        let text = String::from_utf8_lossy(&raw);
        let lines: Vec<&str> = text.split('\n').filter(|l| !l.is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }
}

/// File lines followed by unpersisted memory lines, capped to the newest
/// [`MAX_LOG_LINES`].
pub fn merge(file_lines: Vec<String>, tail: Option<&LogTail>) -> Vec<String> {
    let mut combined = file_lines;
    if let Some(tail) = tail {
        combined.extend(tail.unpersisted().map(str::to_string));
    }
    let start = combined.len().saturating_sub(MAX_LOG_LINES);
    combined.split_off(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_evicts_oldest() {
        let mut tail = LogTail::default();
        for i in 0..(MAX_LOG_LINES + 20) {
            tail.push(format!("line {}", i), true);
        }
        assert_eq!(tail.lines.len(), MAX_LOG_LINES);
        assert_eq!(tail.lines.front().map(|l| l.text.as_str()), Some("line 20"));
        assert_eq!(tail.lines.back().map(|l| l.text.as_str()), Some("line 519"));
    }

    #[tokio::test]
    async fn test_append_and_read_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("Log"));

        assert!(store.read_tail("nginx", 10).await.is_empty());
        assert!(store.append("nginx", "[OUT] ready").await);
        assert!(store.append("nginx", "[ERR] warning").await);

        let raw = std::fs::read_to_string(store.path("nginx")).unwrap();
        assert_eq!(raw, "[OUT] ready\n[ERR] warning\n");
        assert_eq!(
            store.read_tail("nginx", 10).await,
            vec!["[OUT] ready", "[ERR] warning"]
        );
        assert_eq!(store.read_tail("nginx", 1).await, vec!["[ERR] warning"]);
    }

    #[test]
    fn test_merge_caps_and_skips_persisted() {
        let file: Vec<String> = (0..600).map(|i| format!("f{}", i)).collect();
        let mut tail = LogTail::default();
        tail.push("f599".to_string(), true);
        tail.push("lost".to_string(), false);

        let merged = merge(file, Some(&tail));
        assert_eq!(merged.len(), MAX_LOG_LINES);
        assert_eq!(merged.last().map(String::as_str), Some("lost"));
        assert_eq!(merged.iter().filter(|l| *l == "f599").count(), 1);
    }

    #[test]
    fn test_merge_without_tail() {
        let merged = merge(vec!["a".into(), "b".into()], None);
        assert_eq!(merged, vec!["a", "b"]);
    }
}
