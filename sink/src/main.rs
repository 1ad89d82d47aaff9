//! Stand-in receiver for the TCP simulation backend.
//!
//! Logs the gap between consecutive bytes (pacing check) and prints each
//! received line, discarding heartbeats.

use bytes::BytesMut;
use spp_link::protocol::HEARTBEAT;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Accumulates bytes into newline-terminated lines
#[derive(Debug, Default)]
struct LineAssembler {
    buf: BytesMut,
}

impl LineAssembler {
    /// Feed one byte; returns a completed payload line, heartbeats excluded
    fn push(&mut self, byte: u8) -> Option<String> {
        self.buf.extend_from_slice(&[byte]);
        if byte != b'\n' {
            return None;
        }
        let line = self.buf.split();
        if &line[..] == HEARTBEAT {
            return None;
        }
        Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:9000".into());
    let listener = TcpListener::bind(&addr).await?;
    info!("Sink listening on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Connection from: {}", peer);
        tokio::spawn(async move {
            if let Err(e) = receive(socket).await {
                warn!("Read error from {}: {}", peer, e);
            }
            info!("Client disconnected: {}", peer);
        });
    }
}

async fn receive(mut socket: TcpStream) -> anyhow::Result<()> {
    let mut lines = LineAssembler::default();
    let mut last: Option<Instant> = None;
    let mut buf = [0u8; 256];

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let now = Instant::now();
        for &byte in &buf[..n] {
            let gap = last.map(|t| now.duration_since(t)).unwrap_or(Duration::ZERO);
            debug!("byte 0x{:02x} after {:?}", byte, gap);
            last = Some(now);

            if let Some(line) = lines.push(byte) {
                info!("Received: {}", line);
            }
        }
    }
}
