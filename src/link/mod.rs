//! Serial-port link lifecycle
//!
//! This module handles:
//! - Peer handle resolution (once, cached across reconnects)
//! - Channel setup against the SPP service identifier
//! - Rate-limited heartbeats
//! - Byte-paced sends for a receiver without flow control

mod channel;
mod manager;
mod peer;

pub use manager::LinkManager;
pub use peer::PeerAddress;
