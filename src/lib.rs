//! Client-side connection manager for a Bluetooth serial-port (RFCOMM/SPP)
//! link without hardware flow control.
//!
//! [`LinkManager`] owns one outbound channel to one peer. It resolves the
//! peer through a [`LocalAdapter`], checks liveness with a rate-limited
//! heartbeat and paces outbound bytes, since the transport has no CTS/RTS.

pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod transport;

pub use config::{BackendMode, LinkConfig};
pub use error::LinkError;
pub use link::{LinkManager, PeerAddress};
pub use transport::{LocalAdapter, RemoteDevice, ServiceSocket};
