use std::{collections::BTreeMap, path::Path, sync::Arc};

use tracing::{debug, warn};

use crate::{
    AuditEvent, AuditEventKind, AuditSink, BackgroundSink, JsonlAuditLog, Result, Sanitizer,
};

/// Cheap-to-clone handle used by the dispatcher to record audit events.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Option<Arc<dyn AuditSink>>,
    sanitizer: Arc<Sanitizer>,
}

impl AuditLogger {
    /// A logger that drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            sanitizer: Arc::new(Sanitizer::new()),
        }
    }

    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink: Some(sink),
            sanitizer: Arc::new(Sanitizer::new()),
        }
    }

    /// Open a JSONL audit log at `path`, written from a background thread.
    pub fn jsonl(path: &Path) -> Result<Self> {
        let log = JsonlAuditLog::open(path)?;
        debug!(path = %log.path().display(), "audit log opened");
        let writer = BackgroundSink::spawn(Arc::new(log))?;
        Ok(Self::new(Arc::new(writer)))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Sanitize and append one event.
    ///
    /// Never fails: sink errors are reported with `warn!` and swallowed.
    pub fn record<K, V, I>(&self, kind: AuditEventKind, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), self.sanitizer.sanitize(v.as_ref())))
            .collect();
        let event = AuditEvent::now(kind, fields);
        if let Err(e) = sink.append(&event) {
            warn!(error = %e, kind = %kind, "failed to write audit event");
        }
    }

    /// Wait until every recorded event has been written. Blocks the calling
    /// thread; call from `spawn_blocking` on the runtime.
    pub fn flush(&self) {
        if let Some(sink) = self.sink.as_ref()
            && let Err(e) = sink.flush()
        {
            warn!(error = %e, "failed to flush audit log");
        }
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
