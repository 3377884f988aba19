//! Inbound message processing: the glue between the chat adapter and the
//! worker bridge.
//!
//! Flow: inbound envelope → loop suppression → authorization → (voice:
//! download + transcribe) → parse command → worker call → render reply →
//! send via the chat adapter.

pub mod command;
pub mod dispatch;
pub mod error;
pub mod reply;

pub use {
    command::{Command, parse},
    dispatch::{DispatchSettings, Dispatcher, Outcome, SkipReason},
    error::{Error, Result},
};
