//! Shared types, error definitions, and utilities used across all relay crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{MediaKind, MessageEnvelope},
};
