//! Platform backends the link manager drives
//!
//! - `rfcomm`: BlueZ via `bluer` (production)
//! - `tcp`: TCP simulation for development against `spp-sink`

pub mod bt_discovery;
#[cfg(test)]
pub mod mock;
pub mod rfcomm;
pub mod tcp;
pub mod traits;

pub use bt_discovery::{BtDiscovery, BtDiscoveryConfig};
pub use rfcomm::{BluerAdapter, BluerDevice, BluerSocket, ChannelMapping, RfcommConfig};
pub use tcp::{TcpAdapter, TcpDevice, TcpSocket};
pub use traits::{LocalAdapter, RemoteDevice, ServiceSocket};
