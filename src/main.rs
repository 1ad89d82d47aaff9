use anyhow::Result;
use spp_link::transport::{BluerAdapter, TcpAdapter};
use spp_link::{BackendMode, LinkConfig, LinkManager, LocalAdapter, PeerAddress};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, sleep};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig::from_env()?;

    info!("Serial link starting: {}", config.peer);
    info!("  Backend: {}", config.mode);
    if config.scan {
        info!("  Scan before connect: enabled");
    }

    match config.mode {
        BackendMode::Rfcomm => {
            let adapter = match BluerAdapter::open(config.rfcomm()).await {
                Ok(adapter) => Some(adapter),
                Err(e) => {
                    error!("No Bluetooth adapter: {:#}", e);
                    None
                }
            };
            if let (true, Some(adapter)) = (config.scan, &adapter) {
                let peer = PeerAddress::new(config.peer.clone());
                if let Err(e) = adapter.scan_for(&peer).await {
                    warn!("Discovery failed: {:#}", e);
                }
            }
            run(config, adapter).await
        }
        BackendMode::TcpSimulation => run(config, Some(TcpAdapter)).await,
    }
}

async fn run<A: LocalAdapter>(config: LinkConfig, adapter: Option<A>) -> Result<()> {
    let link = Arc::new(LinkManager::new(PeerAddress::new(config.peer.clone()), adapter));

    if !link.is_available().await {
        warn!("Adapter not available or not enabled; connects will fail");
    }

    // Keepalive: heartbeat while connected, reconnect with backoff otherwise
    let keepalive = tokio::spawn({
        let link = link.clone();
        let config = config.clone();
        async move { keep_link_alive(link, config).await }
    });

    // Forward stdin lines until EOF or Ctrl-C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !link.is_connected().await {
                        warn!("Link down, dropping line");
                        continue;
                    }
                    let mut payload = line.into_bytes();
                    payload.push(b'\n');
                    link.send(payload.as_slice()).await;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    keepalive.abort();
    link.disconnect().await;
    Ok(())
}

async fn keep_link_alive<A: LocalAdapter>(link: Arc<LinkManager<A>>, config: LinkConfig) {
    let mut reconnect_delay = config.reconnect_delay;
    let mut ticker = interval(config.ping_interval);

    loop {
        ticker.tick().await;

        if link.is_connected().await {
            if !link.ping(config.ping_interval).await {
                warn!("Heartbeat to {} failed", link.peer());
            }
            continue;
        }

        if link.connect().await {
            info!("Connected to {}", link.peer());
            reconnect_delay = config.reconnect_delay;
        } else {
            warn!("Connect failed, retrying in {:?}", reconnect_delay);
            sleep(reconnect_delay).await;
            reconnect_delay = config.next_reconnect_delay(reconnect_delay);
        }
    }
}
