//! Chat-client sidecar adapter.
//!
//! The relay does not speak the chat protocol itself. It launches an external
//! sidecar (a Node.js client by default) and exchanges JSON lines with it over
//! stdio: inbound messages arrive on the sidecar's stdout, sends and media
//! downloads are written to its stdin and acknowledged by `request_id`.

pub mod process;
pub mod sidecar;
pub mod types;

pub use {
    process::{SidecarLaunch, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{DEFAULT_ACK_TIMEOUT, SidecarClient},
    types::{ConnectionState, RelayMessage, SidecarMessage},
};
