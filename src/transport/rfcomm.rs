//! RFCOMM backend on BlueZ via `bluer`

use crate::link::PeerAddress;
use crate::transport::bt_discovery::{BtDiscovery, BtDiscoveryConfig};
use crate::transport::traits::{LocalAdapter, RemoteDevice, ServiceSocket};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Address, Device, Session, Uuid};
use futures::StreamExt;
use tracing::{debug, info};

/// How the service identifier is mapped to an RFCOMM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMapping {
    /// Let BlueZ resolve the channel from the peer's SDP record
    #[default]
    ServiceRecord,
    /// Skip SDP and connect to a known channel
    Fixed(u8),
}

/// Configuration for the RFCOMM backend
#[derive(Debug, Clone, Default)]
pub struct RfcommConfig {
    /// Adapter name (e.g. `hci0`); the default adapter when unset
    pub adapter_name: Option<String>,
    /// Service-to-channel mapping
    pub mapping: ChannelMapping,
    /// Discovery configuration
    pub discovery: BtDiscoveryConfig,
}

/// Local BlueZ adapter
pub struct BluerAdapter {
    session: Session,
    adapter: bluer::Adapter,
    mapping: ChannelMapping,
    discovery: BtDiscovery,
}

impl BluerAdapter {
    /// Open a BlueZ session and pick the configured adapter.
    ///
    /// Fails when bluetoothd is unreachable or no adapter exists; callers
    /// treat that as "no adapter present".
    pub async fn open(config: RfcommConfig) -> Result<Self> {
        let session = Session::new().await?;
        let adapter = match &config.adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("[BT] Using adapter {}", adapter.name());

        Ok(Self {
            session,
            adapter,
            mapping: config.mapping,
            discovery: BtDiscovery::new(config.discovery),
        })
    }

    /// Scan until `peer` is seen or the scan window closes.
    ///
    /// BlueZ only dials devices it has an object for, so an unpaired peer
    /// must be discovered once before the first connect.
    pub async fn scan_for(&self, peer: &PeerAddress) -> Result<()> {
        let target = parse_address(peer)?;
        if self.adapter.device_addresses().await?.contains(&target) {
            debug!("[BT] {} already known", target);
            return Ok(());
        }
        info!("[BT] Scanning for {}", target);
        self.discovery.start(&self.adapter, Some(target)).await?;
        self.discovery.finished().await;
        Ok(())
    }
}

#[async_trait]
impl LocalAdapter for BluerAdapter {
    type Device = BluerDevice;

    async fn is_enabled(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn cancel_discovery(&self) -> Result<()> {
        // A scan started by `scan_for` slows the RFCOMM connect down
        if !self.discovery.cancel() && self.adapter.is_discovering().await? {
            debug!("[BT] Adapter is discovering on behalf of another client");
        }
        Ok(())
    }

    async fn remote_device(&self, address: &PeerAddress) -> Result<BluerDevice> {
        let addr = parse_address(address)?;
        let device = self.adapter.device(addr)?;
        debug!(
            "[BT] Device name: {}",
            device.name().await.ok().flatten().unwrap_or_default()
        );

        Ok(BluerDevice {
            session: self.session.clone(),
            device,
            mapping: self.mapping,
        })
    }
}

/// Parse a peer address as a Bluetooth MAC
pub fn parse_address(address: &PeerAddress) -> Result<Address> {
    address
        .as_str()
        .parse::<Address>()
        .map_err(|e| anyhow!("invalid Bluetooth address {}: {}", address, e))
}

/// Resolved BlueZ device
#[derive(Clone)]
pub struct BluerDevice {
    session: Session,
    device: Device,
    mapping: ChannelMapping,
}

#[async_trait]
impl RemoteDevice for BluerDevice {
    type Socket = BluerSocket;

    async fn create_socket(&self, service: Uuid) -> Result<BluerSocket> {
        let route = match self.mapping {
            ChannelMapping::Fixed(channel) => Route::Fixed(channel),
            ChannelMapping::ServiceRecord => {
                let profile = Profile {
                    uuid: service,
                    role: Some(Role::Client),
                    require_authentication: Some(false),
                    require_authorization: Some(false),
                    auto_connect: Some(false),
                    ..Default::default()
                };
                let handle = self
                    .session
                    .register_profile(profile)
                    .await
                    .context("RFCOMM profile registration failed")?;
                Route::ServiceRecord(Some(handle))
            }
        };

        Ok(BluerSocket {
            device: self.device.clone(),
            service,
            route,
            stream: None,
            connected: false,
        })
    }
}

enum Route {
    ServiceRecord(Option<ProfileHandle>),
    Fixed(u8),
}

/// RFCOMM socket for one service on one device
pub struct BluerSocket {
    device: Device,
    service: Uuid,
    route: Route,
    stream: Option<RfcommStream>,
    connected: bool,
}

#[async_trait]
impl ServiceSocket for BluerSocket {
    type Stream = RfcommStream;

    async fn connect(&mut self) -> Result<()> {
        let Self {
            device,
            service,
            route,
            stream,
            connected: is_connected,
        } = self;
        let target = device.address();

        let opened = match route {
            Route::Fixed(channel) => {
                debug!("[BT] Connecting to {} channel {}", target, channel);
                RfcommStream::connect(RfcommAddr::new(target, *channel))
                    .await
                    .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?
            }
            Route::ServiceRecord(slot) => {
                let handle = slot
                    .as_mut()
                    .ok_or_else(|| anyhow!("RFCOMM profile already released"))?;
                debug!("[BT] Connecting to {} service {}", target, service);

                // ConnectProfile completes only after BlueZ hands the
                // connection to our profile, so both sides run together.
                let request = async {
                    while let Some(req) = handle.next().await {
                        if is_expected_peer(target, req.device()) {
                            return req.accept().map_err(anyhow::Error::from);
                        }
                        // dropping the request rejects it
                        debug!("[BT] Ignoring connect request from {}", req.device());
                    }
                    Err(anyhow!("RFCOMM profile closed before connect"))
                };
                let connect = async {
                    device
                        .connect_profile(service)
                        .await
                        .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))
                };
                let (accepted, ()) = tokio::try_join!(request, connect)?;
                accepted
            }
        };

        info!("[BT] Connected to {}", target);
        *stream = Some(opened);
        *is_connected = true;
        Ok(())
    }

    fn take_stream(&mut self) -> Result<RfcommStream> {
        self.stream
            .take()
            .ok_or_else(|| anyhow!("RFCOMM socket is not connected"))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream = None;
        let connected = std::mem::take(&mut self.connected);
        if let Route::ServiceRecord(slot) = &mut self.route {
            // Dropping the handle unregisters the profile
            if release_profile(slot, connected) {
                self.device.disconnect_profile(&self.service).await?;
            }
        }
        Ok(())
    }
}

/// Whether a profile connect request comes from the device we dialed
fn is_expected_peer(target: Address, from: Address) -> bool {
    target == from
}

/// Drop a registered profile. Returns whether BlueZ holds a profile
/// connection that must be disconnected too.
fn release_profile<H>(slot: &mut Option<H>, connected: bool) -> bool {
    slot.take().is_some() && connected
}
