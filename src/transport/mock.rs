//! Scriptable in-memory backend for tests

use crate::link::PeerAddress;
use crate::transport::bt_discovery::BtDiscovery;
use crate::transport::traits::{LocalAdapter, RemoteDevice, ServiceSocket};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::Uuid;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::time::Instant;

/// Which step of connection setup should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Resolve,
    CreateSocket,
    Connect,
    TakeStream,
}

/// One write call observed on the wire
#[derive(Debug, Clone)]
pub struct WireWrite {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Script {
    enabled: bool,
    fail_at: Option<FailAt>,
    /// Writes fail once this many bytes have been accepted
    write_budget: Option<usize>,
    /// Flushes fail while set; writes still land on the wire
    fail_flushes: bool,
    accepted: usize,
    resolves: usize,
    sockets_opened: usize,
    sockets_closed: usize,
    events: Vec<&'static str>,
    wire: Vec<WireWrite>,
}

/// Shared control/observation handle for a mock backend
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    script: Arc<Mutex<Script>>,
    discovery: Arc<BtDiscovery>,
}

impl MockAdapter {
    pub fn new() -> Self {
        let adapter = Self::default();
        adapter.with(|s| s.enabled = true);
        adapter
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with(|s| s.enabled = enabled);
    }

    pub fn fail_at(&self, step: Option<FailAt>) {
        self.with(|s| s.fail_at = step);
    }

    /// Let `bytes` more bytes through, then fail every write
    pub fn fail_writes_after(&self, bytes: usize) {
        self.with(|s| s.write_budget = Some(s.accepted + bytes));
    }

    pub fn heal_writes(&self) {
        self.with(|s| s.write_budget = None);
    }

    pub fn fail_flushes(&self, fail: bool) {
        self.with(|s| s.fail_flushes = fail);
    }

    /// Begin a discovery session that only ends when cancelled
    pub fn start_discovery(&self) {
        self.discovery.track(futures::stream::pending(), None);
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_running()
    }

    pub fn resolves(&self) -> usize {
        self.with(|s| s.resolves)
    }

    pub fn sockets_opened(&self) -> usize {
        self.with(|s| s.sockets_opened)
    }

    pub fn sockets_closed(&self) -> usize {
        self.with(|s| s.sockets_closed)
    }

    pub fn open_sockets(&self) -> usize {
        self.with(|s| s.sockets_opened - s.sockets_closed)
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.with(|s| s.events.clone())
    }

    pub fn wire(&self) -> Vec<WireWrite> {
        self.with(|s| s.wire.clone())
    }

    /// All bytes written, concatenated
    pub fn wire_bytes(&self) -> Vec<u8> {
        self.with(|s| s.wire.iter().flat_map(|w| w.bytes.clone()).collect())
    }

    fn step(&self, event: &'static str, step: FailAt) -> Result<()> {
        self.with(|s| {
            s.events.push(event);
            if s.fail_at == Some(step) {
                Err(anyhow!("mock failure at {}", event))
            } else {
                Ok(())
            }
        })
    }
}

#[async_trait]
impl LocalAdapter for MockAdapter {
    type Device = MockDevice;

    async fn is_enabled(&self) -> bool {
        self.with(|s| s.enabled)
    }

    async fn cancel_discovery(&self) -> Result<()> {
        self.with(|s| s.events.push("cancel_discovery"));
        self.discovery.cancel();
        Ok(())
    }

    async fn remote_device(&self, _address: &PeerAddress) -> Result<MockDevice> {
        self.with(|s| s.resolves += 1);
        self.step("resolve", FailAt::Resolve)?;
        Ok(MockDevice {
            adapter: self.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    adapter: MockAdapter,
}

#[async_trait]
impl RemoteDevice for MockDevice {
    type Socket = MockSocket;

    async fn create_socket(&self, _service: Uuid) -> Result<MockSocket> {
        self.adapter.step("create_socket", FailAt::CreateSocket)?;
        self.adapter.with(|s| s.sockets_opened += 1);
        Ok(MockSocket {
            adapter: self.adapter.clone(),
            connected: false,
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct MockSocket {
    adapter: MockAdapter,
    connected: bool,
    closed: bool,
}

#[async_trait]
impl ServiceSocket for MockSocket {
    type Stream = MockStream;

    async fn connect(&mut self) -> Result<()> {
        self.adapter.step("connect", FailAt::Connect)?;
        self.connected = true;
        Ok(())
    }

    fn take_stream(&mut self) -> Result<MockStream> {
        self.adapter.step("take_stream", FailAt::TakeStream)?;
        if !self.connected {
            return Err(anyhow!("mock socket not connected"));
        }
        Ok(MockStream {
            adapter: self.adapter.clone(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.adapter.with(|s| {
                s.events.push("close");
                s.sockets_closed += 1;
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockStream {
    adapter: MockAdapter,
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = self.adapter.with(|s| {
            if s.write_budget.is_some_and(|budget| s.accepted >= budget) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link broken"));
            }
            s.accepted += buf.len();
            s.wire.push(WireWrite {
                at: Instant::now(),
                bytes: buf.to_vec(),
            });
            Ok(buf.len())
        });
        Poll::Ready(result)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = self.adapter.with(|s| {
            if s.fail_flushes {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock flush failed"))
            } else {
                Ok(())
            }
        });
        Poll::Ready(result)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
