//! Spawn-per-call worker transport.

use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
        process::{Child, ChildStdin, Command},
    },
    tracing::{debug, warn},
};

use crate::{BridgeRequest, BridgeTransport, Error, Result};

/// How to launch the worker executable.
#[derive(Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment for the worker. Values may hold API keys.
    pub env: Vec<(String, Secret<String>)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: Secret<String>) -> Self {
        self.env.push((key.into(), value));
        self
    }
}

impl std::fmt::Debug for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("WorkerCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("env", &env_keys)
            .finish()
    }
}

/// Launches one fresh worker process per call.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    worker: WorkerCommand,
}

impl ProcessBridge {
    pub fn new(worker: WorkerCommand) -> Self {
        Self { worker }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.worker.program);
        cmd.args(&self.worker.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.worker.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.worker.env {
            cmd.env(key, value.expose_secret());
        }
        cmd
    }
}

#[async_trait]
impl BridgeTransport for ProcessBridge {
    async fn call(&self, request: BridgeRequest, timeout: Duration) -> Result<String> {
        let payload = serde_json::to_vec(&request)?;
        debug!(
            command = %request.command,
            ?timeout,
            "bridge call"
        );

        let started = Instant::now();
        let mut child = self.command().spawn().map_err(|source| Error::Spawn {
            program: self.worker.program.display().to_string(),
            source,
        })?;

        let outcome = tokio::time::timeout(timeout, exchange(&mut child, &payload)).await;
        let output = match outcome {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    command = %request.command,
                    ?timeout,
                    "worker timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out worker");
                }
                return Err(Error::Timeout(timeout));
            },
        };

        debug!(
            command = %request.command,
            exit_code = ?output.status.code(),
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bridge call done"
        );

        interpret_output(output.status.code(), &output.stdout, &output.stderr)
    }
}

struct WorkerOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Write the request, close stdin, and drain both output pipes until exit.
///
/// Writing and reading run concurrently so a worker that answers before
/// consuming all of its input cannot deadlock on a full pipe.
async fn exchange(child: &mut Child, payload: &[u8]) -> Result<WorkerOutput> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (written, stdout, stderr, status) = tokio::join!(
        write_request(stdin, payload),
        read_all(stdout),
        read_all(stderr),
        child.wait(),
    );
    written?;

    Ok(WorkerOutput {
        status: status?,
        stdout: stdout?,
        stderr: stderr?,
    })
}

async fn write_request(stdin: Option<ChildStdin>, payload: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(payload).await {
        // The worker may exit without reading its input.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {},
        Err(e) => return Err(e),
        Ok(()) => {},
    }
    drop(stdin);
    Ok(())
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Reply object printed by the worker on stdout.
#[derive(Debug, Deserialize)]
struct WorkerReply {
    #[serde(default, alias = "text")]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn a finished worker's exit code and output into a bridge result.
///
/// Exit code 0 with a `{"response": ...}` object yields the response text.
/// Output that is not such an object is returned raw and trimmed; malformed
/// output is never an error by itself.
pub fn interpret_output(code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> Result<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let reply = serde_json::from_str::<WorkerReply>(stdout.trim()).ok();

    if code != Some(0) {
        let detail = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if let Some(error) = reply.and_then(|r| r.error) {
            error
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            "no output".to_string()
        };
        return Err(Error::NonZeroExit { code, detail });
    }

    match reply {
        Some(WorkerReply {
            response: Some(text),
            ..
        }) => Ok(text),
        Some(WorkerReply {
            response: None,
            error: Some(error),
        }) => Err(Error::Worker(error)),
        _ => Ok(stdout.trim().to_string()),
    }
}
