//! Link manager: one outbound serial-port link to one peer

use super::channel::{Channel, LinkState};
use super::PeerAddress;
use crate::error::LinkError;
use crate::protocol::{HEARTBEAT, SEND_PACING, SERIAL_PORT_SERVICE};
use crate::transport::{LocalAdapter, RemoteDevice, ServiceSocket};
use bytes::Buf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

type SocketOf<A> = <<A as LocalAdapter>::Device as RemoteDevice>::Socket;

struct Inner<A: LocalAdapter> {
    /// Resolved on the first connect, reused by every reconnect
    device: Option<A::Device>,
    link: LinkState<SocketOf<A>>,
    last_ping: Option<Instant>,
    generation: u64,
}

/// Mediates all access to one outbound connection.
///
/// Every operation is serialized on one state lock. `connect` holds it for
/// the whole blocking connect, so other callers wait behind an in-flight
/// connect. `send` only holds it per byte and releases it while pacing, so
/// `is_connected` and `ping` interleave with a long send; whole sends are
/// serialized by a separate gate.
pub struct LinkManager<A: LocalAdapter> {
    peer: PeerAddress,
    adapter: Option<A>,
    inner: Mutex<Inner<A>>,
    send_gate: Mutex<()>,
}

impl<A: LocalAdapter> LinkManager<A> {
    /// Create a manager for `peer`. `None` means no local adapter exists.
    pub fn new(peer: PeerAddress, adapter: Option<A>) -> Self {
        Self {
            peer,
            adapter,
            inner: Mutex::new(Inner {
                device: None,
                link: LinkState::Disconnected,
                last_ping: None,
                generation: 0,
            }),
            send_gate: Mutex::new(()),
        }
    }

    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Whether the local adapter is present and enabled
    pub async fn is_available(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.is_enabled().await,
            None => false,
        }
    }

    /// Open a fresh channel to the peer, replacing any existing one.
    ///
    /// Blocks until the transport connects or fails. Run it off any
    /// latency-sensitive task.
    pub async fn connect(&self) -> bool {
        debug!("[LINK] About to attempt client connect to {}", self.peer);
        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.link.take() {
            debug!("[LINK] Closing previous channel before reconnecting");
            previous.close().await;
        }

        let generation = inner.generation + 1;
        match self.open_channel(&mut inner.device, generation).await {
            Ok(channel) => {
                inner.generation = generation;
                inner.link = LinkState::Connected(channel);
                info!("[LINK] Connected to {}", self.peer);
                true
            }
            Err(e) => {
                warn!("[LINK] Could not connect to {} ({}): {}", self.peer, e.step(), e);
                false
            }
        }
    }

    async fn open_channel(
        &self,
        cached: &mut Option<A::Device>,
        generation: u64,
    ) -> Result<Channel<SocketOf<A>>, LinkError> {
        let adapter = self.adapter.as_ref().ok_or(LinkError::AdapterUnavailable)?;

        let device = match cached.clone() {
            Some(device) => device,
            None => {
                let device = adapter
                    .remote_device(&self.peer)
                    .await
                    .map_err(LinkError::Resolve)?;
                *cached = Some(device.clone());
                device
            }
        };

        let mut socket = device
            .create_socket(SERIAL_PORT_SERVICE)
            .await
            .map_err(LinkError::OpenChannel)?;

        // Discovery is heavyweight; it must not run during connection setup
        if let Err(e) = adapter.cancel_discovery().await {
            warn!("[LINK] Unable to cancel discovery: {:#}", e);
        }

        let connected = socket.connect().await;
        if let Err(e) = connected {
            close_socket(&mut socket).await;
            return Err(LinkError::Connect(e));
        }

        match socket.take_stream() {
            Ok(stream) => Ok(Channel::new(socket, stream, generation)),
            Err(e) => {
                close_socket(&mut socket).await;
                Err(LinkError::AcquireStream(e))
            }
        }
    }

    /// True while a live channel is held. No I/O.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.link.is_connected()
    }

    /// Rate-limited liveness check.
    ///
    /// Within `interval` of the last heartbeat this reports success without
    /// writing. A failed heartbeat write is reported but leaves the channel
    /// open; only `send` tears the link down.
    pub async fn ping(&self, interval: Duration) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(channel) = inner.link.channel_mut() else {
            debug!("[LINK] No channel yet, ping skipped");
            return false;
        };

        let now = Instant::now();
        if inner
            .last_ping
            .is_some_and(|last| now.duration_since(last) < interval)
        {
            // previous ping still fresh
            return true;
        }
        inner.last_ping = Some(now);

        match channel.write_payload(HEARTBEAT).await {
            Ok(()) => {
                debug!("[LINK] Successful ping");
                true
            }
            Err(e) => {
                debug!("[LINK] Heartbeat write failed: {}", e);
                false
            }
        }
    }

    /// Write `buf` one byte at a time, flushing and pacing after each.
    ///
    /// Failures are not returned: the first failed write closes the link
    /// and drops the rest of the buffer, which callers observe through
    /// `is_connected`.
    pub async fn send(&self, mut buf: impl Buf + Send) {
        let _turn = self.send_gate.lock().await;
        let mut generation = None;

        while buf.has_remaining() {
            let unit = buf.get_u8();
            {
                let mut inner = self.inner.lock().await;
                let Some(channel) = inner.link.channel_mut() else {
                    return;
                };

                // A concurrent connect replaced the channel mid-send
                match generation {
                    None => generation = Some(channel.generation()),
                    Some(g) if g != channel.generation() => {
                        debug!("[LINK] Channel replaced during send, dropping remaining bytes");
                        return;
                    }
                    Some(_) => {}
                }

                let written = channel.write_unit(unit).await;
                if let Err(e) = written {
                    error!("[LINK] Error writing to {}, closing link: {}", self.peer, e);
                    if let Some(channel) = inner.link.take() {
                        channel.close().await;
                    }
                    return;
                }
            }

            // No CTS/RTS on this link; pacing is the only flow control
            sleep(SEND_PACING).await;
        }
    }

    /// Close and clear the channel, if any
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(channel) = inner.link.take() {
            channel.close().await;
            info!("[LINK] Disconnected from {}", self.peer);
        }
    }
}

async fn close_socket<S: ServiceSocket>(socket: &mut S) {
    if let Err(e) = socket.close().await {
        error!("[LINK] Unable to close socket during connection failure: {:#}", e);
    }
}
