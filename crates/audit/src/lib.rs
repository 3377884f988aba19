//! Append-only audit trail for the relay.
//!
//! Every event is sanitized before it reaches a sink: secret-looking tokens
//! are redacted and long values truncated. Sink failures are reported through
//! `tracing` and never reach the caller.

pub mod error;
pub mod event;
pub mod logger;
pub mod sanitize;
pub mod sink;

pub use {
    error::{Error, Result},
    event::{AuditEvent, AuditEventKind},
    logger::AuditLogger,
    sanitize::Sanitizer,
    sink::{AuditSink, BackgroundSink, JsonlAuditLog, MemoryAuditSink},
};
