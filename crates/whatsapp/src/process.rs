//! Launching and stopping the chat-client sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    relay_common::MessageEnvelope,
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
        sync::mpsc,
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::sidecar::{DEFAULT_ACK_TIMEOUT, SidecarClient};

/// Grace period between SIGTERM and a hard kill.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How long a freshly started sidecar must stay up to count as started.
const STARTUP_CHECK: Duration = Duration::from_millis(500);

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarLaunch {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory. Searched for when unset.
    pub dir: Option<PathBuf>,
    /// Passed to the sidecar as `RELAY_SIDECAR_AUTH_DIR`.
    pub auth_dir: Option<PathBuf>,
    pub ack_timeout: Duration,
}

impl Default for SidecarLaunch {
    fn default() -> Self {
        Self {
            program: "node".into(),
            args: vec!["dist/index.js".into()],
            dir: None,
            auth_dir: None,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl SidecarProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait until the sidecar's output closes, which happens when it exits.
    pub async fn closed(&mut self) {
        if let Some(reader) = self.reader.take()
            && let Err(e) = reader.await
        {
            warn!(error = %e, "sidecar reader task failed");
        }
    }

    /// Ask the sidecar to exit, killing it if it has not after a grace period.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            info!("chat sidecar process already exited");
            return Ok(());
        }
        info!(pid = ?self.id(), "stopping chat sidecar process");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id().and_then(|p| i32::try_from(p).ok()) {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "chat sidecar process exited");
            },
            Ok(Err(e)) => {
                warn!(error = %e, "error waiting for sidecar process");
            },
            Err(_) => {
                warn!("sidecar process did not exit gracefully, killing");
                self.child
                    .kill()
                    .await
                    .context("failed to kill sidecar process")?;
            },
        }
        Ok(())
    }
}

impl Drop for SidecarProcess {
    fn drop(&mut self) {
        if let Some(pid) = self.child.id() {
            debug!(pid, "dropping sidecar process handle");
        }
    }
}

/// Find the sidecar directory.
///
/// Searches in order:
/// 1. Explicit path if provided
/// 2. Relative to the executable: `../sidecar`, `../../sidecar`
/// 3. Relative to the working directory: `sidecar`, `../sidecar`
pub fn find_sidecar_dir(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        if path.join("package.json").exists() {
            return Ok(path.to_path_buf());
        }
        bail!(
            "sidecar directory does not exist or is missing package.json: {}",
            path.display()
        );
    }

    let mut candidates = Vec::new();
    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        candidates.push(exe_dir.join("../sidecar"));
        candidates.push(exe_dir.join("../../sidecar"));
    }
    candidates.push(PathBuf::from("sidecar"));
    candidates.push(PathBuf::from("../sidecar"));

    for path in candidates {
        if path.join("package.json").exists() {
            return Ok(path.canonicalize().unwrap_or(path));
        }
    }

    bail!("chat sidecar not found. Set sidecar.dir or SIDECAR_DIR to its directory")
}

/// Install and build a node sidecar whose entry point is missing.
async fn ensure_built(dir: &Path, entry: Option<&str>) -> Result<()> {
    let Some(entry) = entry else {
        return Ok(());
    };
    if dir.join(entry).exists() || !dir.join("package.json").exists() {
        return Ok(());
    }
    info!(path = %dir.display(), entry, "building chat sidecar");
    if !dir.join("node_modules").exists() {
        run_npm(dir, &["install"]).await?;
    }
    run_npm(dir, &["run", "build"]).await
}

async fn run_npm(dir: &Path, args: &[&str]) -> Result<()> {
    info!(path = %dir.display(), ?args, "running npm for sidecar");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("npm {} failed: {stderr}", args.join(" "));
    }
    Ok(())
}

/// Start the sidecar and connect a client to its stdio.
///
/// Inbound messages are delivered to `inbound`. The returned client is the
/// relay's outbound channel and media fetcher.
pub async fn start_sidecar(
    launch: &SidecarLaunch,
    inbound: mpsc::Sender<MessageEnvelope>,
) -> Result<(SidecarProcess, Arc<SidecarClient>)> {
    let dir = match &launch.dir {
        Some(dir) => dir.clone(),
        None => find_sidecar_dir(None)?,
    };
    ensure_built(&dir, launch.args.first().map(String::as_str)).await?;

    info!(
        path = %dir.display(),
        program = %launch.program,
        "starting chat sidecar process"
    );

    let mut cmd = Command::new(&launch.program);
    cmd.args(&launch.args)
        .current_dir(&dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(auth_dir) = &launch.auth_dir {
        cmd.env("RELAY_SIDECAR_AUTH_DIR", auth_dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn sidecar process {}", launch.program))?;

    let stdin = child.stdin.take().context("sidecar stdin not captured")?;
    let stdout = child.stdout.take().context("sidecar stdout not captured")?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "chat_sidecar", "{line}");
            }
        });
    }

    let client = SidecarClient::new(stdin, launch.ack_timeout);
    let reader = client.spawn_reader(stdout, inbound);

    tokio::time::sleep(STARTUP_CHECK).await;
    match child.try_wait() {
        Ok(Some(status)) => {
            bail!("sidecar process exited immediately with status: {status}");
        },
        Ok(None) => {},
        Err(e) => {
            bail!("failed to check sidecar process status: {e}");
        },
    }

    info!(pid = child.id(), "chat sidecar process started");
    Ok((
        SidecarProcess {
            child,
            reader: Some(reader),
        },
        client,
    ))
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn shell(script: &str, dir: &Path) -> SidecarLaunch {
        SidecarLaunch {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            dir: Some(dir.to_path_buf()),
            auth_dir: None,
            ack_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn delivers_inbound_and_stops_on_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"echo '{"type":"connected"}'
echo 'plain log line'
echo '{"type":"inbound_message","id":"m1","conversationId":"1@s.whatsapp.net","isSelfSent":true,"bodyText":"/status"}'
exec sleep 30"#;
        let (tx, mut rx) = mpsc::channel(4);

        let (mut process, client) = start_sidecar(&shell(script, dir.path()), tx).await.unwrap();
        let env = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(env.id, "m1");
        assert!(client.is_connected());
        assert!(process.is_running());

        let started = std::time::Instant::now();
        process.stop().await.unwrap();
        assert!(started.elapsed() < STOP_GRACE);
        assert!(!process.is_running());
        process.closed().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn stop_after_sidecar_exit_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let (mut process, client) = start_sidecar(
            &shell(r#"echo '{"type":"connected"}'; sleep 1"#, dir.path()),
            tx,
        )
        .await
        .unwrap();
        assert!(process.id().is_some());

        process.closed().await;
        assert!(!client.is_connected());
        let started = std::time::Instant::now();
        process.stop().await.unwrap();
        assert!(started.elapsed() < STOP_GRACE);
    }

    #[tokio::test]
    async fn immediate_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = start_sidecar(&shell("exit 3", dir.path()), tx)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("exited immediately"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let launch = SidecarLaunch {
            program: "/nonexistent/relay-sidecar".into(),
            args: Vec::new(),
            dir: Some(dir.path().to_path_buf()),
            ..SidecarLaunch::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        assert!(start_sidecar(&launch, tx).await.is_err());
    }

    #[tokio::test]
    async fn auth_dir_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut launch = shell(
            r#"echo "{\"type\":\"connected\",\"phone_number\":\"$RELAY_SIDECAR_AUTH_DIR\"}"; exec sleep 30"#,
            dir.path(),
        );
        launch.auth_dir = Some(PathBuf::from("/tmp/relay-auth"));
        let (tx, _rx) = mpsc::channel(1);

        let (mut process, client) = start_sidecar(&launch, tx).await.unwrap();
        assert_eq!(
            client.state(),
            crate::types::ConnectionState::Connected {
                phone_number: Some("/tmp/relay-auth".into())
            }
        );
        process.stop().await.unwrap();
    }

    #[test]
    fn explicit_dir_requires_package_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_sidecar_dir(Some(dir.path())).is_err());
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(find_sidecar_dir(Some(dir.path())).unwrap(), dir.path());
    }
}
