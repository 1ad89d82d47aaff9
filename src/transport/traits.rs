//! Platform capability traits the link manager drives
//!
//! The manager never speaks RFCOMM itself. It is handed a [`LocalAdapter`]
//! and walks it through resolve -> open socket -> connect -> take stream.

use crate::link::PeerAddress;
use anyhow::Result;
use async_trait::async_trait;
use bluer::Uuid;
use tokio::io::AsyncWrite;

/// The local radio adapter
#[async_trait]
pub trait LocalAdapter: Send + Sync + 'static {
    /// Resolved remote device type
    type Device: RemoteDevice;

    /// Whether the adapter is present and enabled
    async fn is_enabled(&self) -> bool;

    /// Stop any peer discovery this adapter is running.
    ///
    /// Discovery and connection setup contend for the same radio.
    async fn cancel_discovery(&self) -> Result<()>;

    /// Resolve a peer address to a device handle
    async fn remote_device(&self, address: &PeerAddress) -> Result<Self::Device>;
}

/// A resolved remote device (the cached peer handle)
#[async_trait]
pub trait RemoteDevice: Clone + Send + Sync + 'static {
    /// Socket type produced for a service
    type Socket: ServiceSocket;

    /// Create an unconnected socket for the given service class
    async fn create_socket(&self, service: Uuid) -> Result<Self::Socket>;
}

/// A socket bound to one service on one remote device
#[async_trait]
pub trait ServiceSocket: Send + 'static {
    /// Duplex byte stream obtained once connected
    type Stream: AsyncWrite + Send + Unpin + 'static;

    /// Connect, blocking the caller until established or failed
    async fn connect(&mut self) -> Result<()>;

    /// Take the byte stream of a connected socket
    fn take_stream(&mut self) -> Result<Self::Stream>;

    /// Release the socket and anything it still holds
    async fn close(&mut self) -> Result<()>;
}
