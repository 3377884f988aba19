use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use tracing::warn;

use crate::{AuditEvent, Error, Result};

/// Events that may wait for the writer thread before callers block.
const WRITER_QUEUE: usize = 4096;

/// Destination for audit events. Implementations only ever append.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Block until every event appended so far has been written.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file readable only by the owner.
pub struct JsonlAuditLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonlAuditLog {
    /// Open (or create) the log for appending. Parent directories are created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path)?;

        // `mode` only applies on creation; tighten pre-existing files too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = self
            .writer
            .lock()
            .map_err(|_| Error::Unavailable("audit writer lock poisoned".into()))?;
        // Single write per record so concurrent appenders never interleave lines.
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

enum Queued {
    Event(AuditEvent),
    Flush(mpsc::SyncSender<()>),
}

/// Hands events to a dedicated `audit-writer` thread that owns the inner
/// sink, so callers on the async runtime never wait on disk i/o.
///
/// The thread exits once the last handle is dropped, after writing whatever
/// is still queued.
pub struct BackgroundSink {
    tx: mpsc::SyncSender<Queued>,
}

impl BackgroundSink {
    pub fn spawn(inner: Arc<dyn AuditSink>) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(WRITER_QUEUE);
        thread::Builder::new()
            .name("audit-writer".into())
            .spawn(move || writer_loop(inner.as_ref(), rx))?;
        Ok(Self { tx })
    }

    fn send(&self, item: Queued) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| Error::Unavailable("audit writer thread has stopped".into()))
    }
}

fn writer_loop(inner: &dyn AuditSink, rx: mpsc::Receiver<Queued>) {
    for item in rx {
        match item {
            Queued::Event(event) => {
                if let Err(e) = inner.append(&event) {
                    warn!(error = %e, kind = %event.kind, "failed to write audit event");
                }
            },
            Queued::Flush(done) => {
                if let Err(e) = inner.flush() {
                    warn!(error = %e, "failed to flush audit log");
                }
                let _ = done.send(());
            },
        }
    }
}

impl AuditSink for BackgroundSink {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        self.send(Queued::Event(event.clone()))
    }

    fn flush(&self) -> Result<()> {
        let (done, wait) = mpsc::sync_channel(1);
        self.send(Queued::Flush(done))?;
        wait.recv()
            .map_err(|_| Error::Unavailable("audit writer thread has stopped".into()))
    }
}

/// Keeps events in memory. Useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::Unavailable("memory sink lock poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
