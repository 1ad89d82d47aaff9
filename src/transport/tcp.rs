//! TCP simulation backend for development without a radio
//!
//! The peer address is `host:port` (typically an `spp-sink` instance).

use crate::link::PeerAddress;
use crate::transport::traits::{LocalAdapter, RemoteDevice, ServiceSocket};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::Uuid;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info};

/// Stand-in for the local adapter; always present and enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpAdapter;

#[async_trait]
impl LocalAdapter for TcpAdapter {
    type Device = TcpDevice;

    async fn is_enabled(&self) -> bool {
        true
    }

    async fn cancel_discovery(&self) -> Result<()> {
        Ok(())
    }

    async fn remote_device(&self, address: &PeerAddress) -> Result<TcpDevice> {
        let addr = lookup_host(address.as_str())
            .await?
            .next()
            .ok_or_else(|| anyhow!("{} did not resolve to any address", address))?;
        debug!("[TCP] Resolved {} to {}", address, addr);
        Ok(TcpDevice { addr })
    }
}

/// A resolved socket address
#[derive(Debug, Clone, Copy)]
pub struct TcpDevice {
    addr: SocketAddr,
}

impl TcpDevice {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl RemoteDevice for TcpDevice {
    type Socket = TcpSocket;

    async fn create_socket(&self, service: Uuid) -> Result<TcpSocket> {
        // No service records over TCP; the port is the channel
        debug!("[TCP] Service {} maps to {}", service, self.addr);
        Ok(TcpSocket {
            addr: self.addr,
            stream: None,
        })
    }
}

/// Unconnected or connected TCP socket
#[derive(Debug)]
pub struct TcpSocket {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

#[async_trait]
impl ServiceSocket for TcpSocket {
    type Stream = TcpStream;

    async fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect(self.addr).await?;
        // Single-byte writes must leave immediately
        stream.set_nodelay(true)?;
        info!("[TCP] Connected to {}", self.addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn take_stream(&mut self) -> Result<TcpStream> {
        self.stream
            .take()
            .ok_or_else(|| anyhow!("TCP socket to {} is not connected", self.addr))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
