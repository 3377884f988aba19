//! Request/response calls to the automation worker.
//!
//! Each call is independent: the transport keeps no session, ordering, or
//! retry state. Continuity between calls (current directory, active session)
//! belongs to the worker's backend.

pub mod error;
pub mod process;
pub mod request;

use {async_trait::async_trait, std::time::Duration};

pub use {
    error::{Error, Result},
    process::{ProcessBridge, WorkerCommand, interpret_output},
    request::BridgeRequest,
};

/// Executes one bridge request and returns the worker's text.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn call(&self, request: BridgeRequest, timeout: Duration) -> Result<String>;
}
