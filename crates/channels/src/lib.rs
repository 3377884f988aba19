//! Chat-side building blocks: identity normalization, access gating, loop
//! suppression, and the outbound traits a chat adapter implements.

pub mod dedup;
pub mod error;
pub mod gating;
pub mod identity;
pub mod plugin;

pub use {
    dedup::{DedupGuard, looks_self_generated},
    error::{Error, Result},
    gating::{AccessDenied, AuthPolicy, authorize},
    plugin::{ChannelOutbound, MediaFetcher},
};
