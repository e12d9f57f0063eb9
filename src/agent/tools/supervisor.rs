//! Process supervisor - one OS process per tool name.
//!
//! Each started tool gets a watcher task that owns the child handle. Output
//! from stdout and stderr is funnelled through a single channel so lines are
//! written in arrival order, and the watcher removes the tool's entry as soon
//! as the process exits. `is_running` therefore tracks the OS, not stale
//! bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, RwLock};

use super::error::SupervisorError;
use super::logs::{self, LogStore, LogTail, MAX_LOG_LINES};

/// How deep executable discovery descends below the search root.
pub const MAX_SEARCH_DEPTH: usize = 3;

/// Output still buffered in the pipes when the process exits is collected for
/// at most this long. Grandchildren can keep a pipe open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

struct RunningProcess {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    stop_tx: mpsc::UnboundedSender<()>,
    tail: Arc<Mutex<LogTail>>,
}

/// Snapshot of a supervised process.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Supervisor {
    bin_root: PathBuf,
    log_store: LogStore,
    procs: Arc<RwLock<HashMap<String, RunningProcess>>>,
}

impl Supervisor {
    pub fn new(bin_root: impl Into<PathBuf>, log_store: LogStore) -> Self {
        Self {
            bin_root: bin_root.into(),
            log_store,
            procs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn is_running(&self, tool: &str) -> bool {
        self.procs.read().await.contains_key(tool)
    }

    pub async fn running(&self) -> Vec<ProcessInfo> {
        let procs = self.procs.read().await;
        let mut list: Vec<ProcessInfo> = procs
            .iter()
            .map(|(name, p)| ProcessInfo {
                name: name.clone(),
                pid: p.pid,
                started_at: p.started_at,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Start `tool` from `exec_path` with its working directory set to the
    /// executable's directory.
    ///
    /// Returns once the OS has accepted the spawn; a spawn failure is the
    /// start's failure.
    pub async fn start(
        &self,
        tool: &str,
        exec_path: &Path,
        args: &[String],
    ) -> Result<(), SupervisorError> {
        if self.is_running(tool).await {
            return Err(SupervisorError::AlreadyRunning(tool.to_string()));
        }

        let resolved = resolve_executable(&self.bin_root, tool, exec_path).await?;
        let cwd = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.bin_root.clone());

        let spawned = {
            let mut procs = self.procs.write().await;
            if procs.contains_key(tool) {
                return Err(SupervisorError::AlreadyRunning(tool.to_string()));
            }

            match Command::new(&resolved)
                .args(args)
                .current_dir(&cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
            {
                Ok(mut child) => {
                    let started_at = Utc::now();
                    let (line_tx, line_rx) = mpsc::unbounded_channel();
                    let (stop_tx, stop_rx) = mpsc::unbounded_channel();
                    let tail = Arc::new(Mutex::new(LogTail::default()));

                    // Queued first so it precedes any process output.
                    let _ = line_tx.send(format!("Started {} at {}", tool, started_at.to_rfc3339()));

                    if let Some(stdout) = child.stdout.take() {
                        tokio::spawn(forward_lines(stdout, "[OUT]", line_tx.clone()));
                    }
                    if let Some(stderr) = child.stderr.take() {
                        tokio::spawn(forward_lines(stderr, "[ERR]", line_tx.clone()));
                    }
                    drop(line_tx);

                    procs.insert(
                        tool.to_string(),
                        RunningProcess {
                            pid: child.id(),
                            started_at,
                            stop_tx,
                            tail: tail.clone(),
                        },
                    );

                    Ok((child, line_rx, stop_rx, tail))
                }
                Err(source) => Err(source),
            }
        };

        match spawned {
            Ok((child, line_rx, stop_rx, tail)) => {
                tracing::info!("Started {} ({})", tool, resolved.display());
                let watcher = Watcher {
                    supervisor: self.clone(),
                    tool: tool.to_string(),
                    tail,
                };
                tokio::spawn(watcher.run(child, line_rx, stop_rx));
                Ok(())
            }
            Err(source) => {
                self.log_store
                    .append(tool, &format!("[ERR] Spawn error: {}", source))
                    .await;
                tracing::warn!("Failed to spawn {}: {}", resolved.display(), source);
                Err(SupervisorError::Spawn {
                    path: resolved,
                    source,
                })
            }
        }
    }

    /// Ask the process to terminate. Returns without waiting for the exit;
    /// the entry disappears once the watcher observes it.
    pub async fn stop(&self, tool: &str) -> Result<(), SupervisorError> {
        let procs = self.procs.read().await;
        let entry = procs
            .get(tool)
            .ok_or_else(|| SupervisorError::NotRunning(tool.to_string()))?;

        if entry.stop_tx.send(()).is_err() {
            tracing::debug!("Watcher for {} already finished", tool);
        }
        Ok(())
    }

    /// Request termination of every supervised process.
    pub async fn stop_all(&self) -> Vec<String> {
        let procs = self.procs.read().await;
        for entry in procs.values() {
            let _ = entry.stop_tx.send(());
        }
        procs.keys().cloned().collect()
    }

    /// Persisted log lines plus anything only held in memory, newest last,
    /// capped to [`MAX_LOG_LINES`].
    pub async fn get_logs(&self, tool: &str) -> Vec<String> {
        let file_lines = self.log_store.read_tail(tool, MAX_LOG_LINES).await;

        let tail = {
            let procs = self.procs.read().await;
            procs.get(tool).map(|p| p.tail.clone())
        };

        match tail {
            Some(tail) => {
                let tail = tail.lock().await;
                logs::merge(file_lines, Some(&*tail))
            }
            None => logs::merge(file_lines, None),
        }
    }

    async fn record(&self, tool: &str, tail: Option<&Mutex<LogTail>>, line: String) {
        let persisted = self.log_store.append(tool, &line).await;
        if let Some(tail) = tail {
            tail.lock().await.push(line, persisted);
        }
    }
}

struct Watcher {
    supervisor: Supervisor,
    tool: String,
    tail: Arc<Mutex<LogTail>>,
}

impl Watcher {
    async fn run(
        self,
        mut child: Child,
        mut lines: mpsc::UnboundedReceiver<String>,
        mut stop_rx: mpsc::UnboundedReceiver<()>,
    ) {
        let status = loop {
            // Queued output always goes first so the log keeps arrival order.
            tokio::select! {
                biased;
                Some(line) = lines.recv() => self.record(line).await,
                Some(()) = stop_rx.recv() => {
                    while let Ok(line) = lines.try_recv() {
                        self.record(line).await;
                    }
                    self.record(format!(
                        "Stop requested {} at {}",
                        self.tool,
                        Utc::now().to_rfc3339()
                    ))
                    .await;
                    if let Err(e) = terminate(&mut child) {
                        tracing::warn!("Failed to signal {}: {}", self.tool, e);
                    }
                }
                status = child.wait() => break status,
            }
        };

        let drain = async {
            while let Some(line) = lines.recv().await {
                self.record(line).await;
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
            tracing::debug!("Output of {} still open after exit", self.tool);
        }

        let exit_line = match status {
            Ok(status) => describe_exit(status),
            Err(e) => format!("Process wait failed: {}", e),
        };
        tracing::info!("{}: {}", self.tool, exit_line);
        self.supervisor.record(&self.tool, None, exit_line).await;

        self.supervisor.procs.write().await.remove(&self.tool);
    }

    async fn record(&self, line: String) {
        self.supervisor.record(&self.tool, Some(self.tail.as_ref()), line).await;
    }
}

async fn forward_lines<R>(reader: R, prefix: &'static str, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if tx.send(format!("{} {}", prefix, text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Output stream closed with error: {}", e);
                break;
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(std::io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

fn describe_exit(status: ExitStatus) -> String {
    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string());
    format!("Process exited code={} signal={}", code, exit_signal(&status))
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(sig) => nix::sys::signal::Signal::try_from(sig)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| sig.to_string()),
        None => "null".to_string(),
    }
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> String {
    "null".to_string()
}

/// Resolve `exec_path` against `bin_root`, falling back to a bounded search
/// of the surrounding directory tree.
pub async fn resolve_executable(
    bin_root: &Path,
    tool: &str,
    exec_path: &Path,
) -> Result<PathBuf, SupervisorError> {
    let resolved = if exec_path.is_absolute() {
        exec_path.to_path_buf()
    } else {
        bin_root.join(exec_path)
    };

    let is_file = tokio::fs::metadata(&resolved)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if is_file {
        return Ok(resolved);
    }

    let search_root = resolved
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| bin_root.to_path_buf());
    let tool_name = tool.to_string();

    let found = tokio::task::spawn_blocking(move || find_executable(&search_root, &tool_name))
        .await
        .ok()
        .flatten();

    match found {
        Some(path) => {
            tracing::info!("Discovered executable for {} at {}", tool, path.display());
            Ok(path)
        }
        None => Err(SupervisorError::ExecutableNotFound(resolved)),
    }
}

/// Depth-first search for `<tool><exe suffix>`, falling back to the first
/// executable-looking file seen.
fn find_executable(root: &Path, tool: &str) -> Option<PathBuf> {
    let wanted = format!("{}{}", tool, std::env::consts::EXE_SUFFIX).to_lowercase();
    let mut fallback: Option<PathBuf> = None;
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        let Ok(read) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut entries: Vec<_> = read.filter_map(Result::ok).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                if depth < MAX_SEARCH_DEPTH {
                    subdirs.push(path);
                }
            } else if path.is_file() {
                if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                    return Some(path);
                }
                if fallback.is_none() && looks_executable(&path) {
                    fallback = Some(path);
                }
            }
        }

        // Reversed so the stack pops them in name order.
        stack.extend(subdirs.into_iter().rev().map(|d| (d, depth + 1)));
    }

    fallback
}

#[cfg(unix)]
fn looks_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn looks_executable(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, executable: bool) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = executable;
    }

    fn exe(name: &str) -> String {
        format!("{}{}", name, std::env::consts::EXE_SUFFIX)
    }

    async fn wait_until_stopped(supervisor: &Supervisor, tool: &str) {
        for _ in 0..100 {
            if !supervisor.is_running(tool).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{} still running", tool);
    }

    async fn wait_for_line(supervisor: &Supervisor, tool: &str, line: &str) {
        for _ in 0..100 {
            if supervisor.get_logs(tool).await.iter().any(|l| l == line) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{} never logged {:?}", tool, line);
    }

    fn supervisor_in(dir: &Path) -> Supervisor {
        Supervisor::new(dir.join("bin"), LogStore::new(dir.join("Log")))
    }

    #[tokio::test]
    async fn test_resolve_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let direct = bin.join("redis").join("7.2").join(exe("redis"));
        touch(&direct, true);

        let rel = Path::new("redis").join("7.2").join(exe("redis"));
        let resolved = resolve_executable(&bin, "redis", &rel).await.unwrap();
        assert_eq!(resolved, direct);
    }

    #[tokio::test]
    async fn test_resolve_discovers_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let nested = bin.join("nginx").join("nginx-1.25.3").join(exe("nginx"));
        touch(&nested, true);

        let resolved = resolve_executable(&bin, "nginx", Path::new(&exe("nginx")))
            .await
            .unwrap();
        assert_eq!(resolved, nested);
    }

    #[tokio::test]
    async fn test_name_match_beats_earlier_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("php");
        touch(&root.join("a-helper").join(exe("php-cgi")), true);
        touch(&root.join("z").join(exe("php")), true);

        assert_eq!(find_executable(&root, "php"), Some(root.join("z").join(exe("php"))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fallback_to_any_executable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("mailpit");
        touch(&root.join("README"), false);
        touch(&root.join("bin").join("mailpit-server"), true);

        assert_eq!(
            find_executable(&root, "mailpit"),
            Some(root.join("bin").join("mailpit-server"))
        );
    }

    #[tokio::test]
    async fn test_search_depth_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("deep");
        let at_limit = root.join("1").join("2").join("3").join(exe("deep"));
        touch(&at_limit, true);
        assert_eq!(find_executable(&root, "deep"), Some(at_limit.clone()));

        std::fs::remove_file(&at_limit).unwrap();
        touch(&root.join("1/2/3/4").join(exe("deep")), true);
        assert_eq!(find_executable(&root, "deep"), None);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());

        let err = supervisor
            .start("ghost", Path::new("ghost/1.0/ghost"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::ExecutableNotFound(_)));
        assert!(!supervisor.is_running("ghost").await);
    }

    #[tokio::test]
    async fn test_stop_never_started() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());

        let err = supervisor.stop("redis").await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_twice_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());
        let args = vec!["-c".to_string(), "echo hello; exec sleep 30".to_string()];

        supervisor.start("redis", Path::new("/bin/sh"), &args).await.unwrap();
        assert!(supervisor.is_running("redis").await);

        let err = supervisor
            .start("redis", Path::new("/bin/sh"), &args)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning(_)));

        wait_for_line(&supervisor, "redis", "[OUT] hello").await;
        supervisor.stop("redis").await.unwrap();
        wait_until_stopped(&supervisor, "redis").await;

        let logs = supervisor.get_logs("redis").await;
        assert_eq!(logs.len(), 4, "{:?}", logs);
        assert!(logs[0].starts_with("Started redis at "), "{:?}", logs);
        assert_eq!(logs[1], "[OUT] hello");
        assert!(logs[2].starts_with("Stop requested redis at "), "{:?}", logs);
        assert_eq!(logs[3], "Process exited code=null signal=SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_immediate_stop_logs_start_first() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];

        for _ in 0..5 {
            supervisor.start("valkey", Path::new("/bin/sh"), &args).await.unwrap();
            supervisor.stop("valkey").await.unwrap();
            wait_until_stopped(&supervisor, "valkey").await;
        }

        let logs = supervisor.get_logs("valkey").await;
        assert_eq!(logs.len(), 15, "{:?}", logs);
        for run in logs.chunks(3) {
            assert!(run[0].starts_with("Started valkey at "), "{:?}", run);
            assert!(run[1].starts_with("Stop requested valkey at "), "{:?}", run);
            assert!(run[2].starts_with("Process exited"), "{:?}", run);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_deregisters_and_keeps_logs() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());
        let args = vec!["-c".to_string(), "echo bye; echo oops >&2".to_string()];

        supervisor.start("mysql", Path::new("/bin/sh"), &args).await.unwrap();
        wait_until_stopped(&supervisor, "mysql").await;

        let logs = supervisor.get_logs("mysql").await;
        assert!(logs.iter().any(|l| l == "[OUT] bye"));
        assert!(logs.iter().any(|l| l == "[ERR] oops"));
        assert_eq!(
            logs.last().map(String::as_str),
            Some("Process exited code=0 signal=null")
        );

        // Can be started again once the entry is gone.
        supervisor.start("mysql", Path::new("/bin/sh"), &args).await.unwrap();
        wait_until_stopped(&supervisor, "mysql").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());
        let not_exec = dir.path().join("bin").join("pg").join(exe("pg"));
        touch(&not_exec, false);

        let err = supervisor.start("pg", &not_exec, &[]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(!supervisor.is_running("pg").await);

        let logs = supervisor.get_logs("pg").await;
        assert!(logs[0].starts_with("[ERR] Spawn error:"));
    }

    #[tokio::test]
    async fn test_logs_capped_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor_in(dir.path());
        let log_dir = dir.path().join("Log");
        std::fs::create_dir_all(&log_dir).unwrap();

        let content: String = (0..750).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(log_dir.join("nginx.log"), content).unwrap();

        let logs = supervisor.get_logs("nginx").await;
        assert_eq!(logs.len(), MAX_LOG_LINES);
        assert_eq!(logs.first().map(String::as_str), Some("line 250"));
        assert_eq!(logs.last().map(String::as_str), Some("line 749"));
    }
}
