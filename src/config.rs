//! Link configuration

use crate::transport::{ChannelMapping, RfcommConfig};
use anyhow::{anyhow, Context as _, Result};
use std::str::FromStr;
use std::time::Duration;

/// Which backend carries the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// Real RFCOMM Bluetooth (requires BlueZ)
    Rfcomm,
    /// TCP simulation (for development)
    #[default]
    TcpSimulation,
}

impl FromStr for BackendMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rfcomm" | "bluetooth" | "bt" => Ok(BackendMode::Rfcomm),
            "tcp" | "sim" | "tcp-simulation" => Ok(BackendMode::TcpSimulation),
            other => Err(anyhow!("unknown backend mode: {}", other)),
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Rfcomm => write!(f, "RFCOMM"),
            BackendMode::TcpSimulation => write!(f, "TCP simulation"),
        }
    }
}

/// Configuration for a link session
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Peer address: Bluetooth MAC, or `host:port` in TCP simulation
    pub peer: String,
    /// Backend mode
    pub mode: BackendMode,
    /// Fixed RFCOMM channel; SDP lookup by service UUID when unset
    pub rfcomm_channel: Option<u8>,
    /// Adapter name (e.g. `hci0`); default adapter when unset
    pub adapter_name: Option<String>,
    /// Scan for the peer before the first RFCOMM connect
    pub scan: bool,
    /// Heartbeat interval
    pub ping_interval: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peer: "127.0.0.1:9000".into(),
            mode: BackendMode::TcpSimulation,
            rfcomm_channel: None,
            adapter_name: None,
            scan: false,
            ping_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl LinkConfig {
    /// Defaults overridden by `SPP_LINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = lookup("SPP_LINK_MODE") {
            config.mode = mode.parse()?;
        }
        if let Some(peer) = lookup("SPP_LINK_PEER") {
            config.peer = peer;
        }
        if let Some(channel) = lookup("SPP_LINK_CHANNEL") {
            config.rfcomm_channel = Some(
                channel
                    .parse()
                    .with_context(|| format!("invalid SPP_LINK_CHANNEL: {}", channel))?,
            );
        }
        config.adapter_name = lookup("SPP_LINK_ADAPTER");
        if let Some(scan) = lookup("SPP_LINK_SCAN") {
            config.scan = parse_flag(&scan)
                .ok_or_else(|| anyhow!("invalid SPP_LINK_SCAN: {}", scan))?;
        }
        if let Some(ms) = lookup("SPP_LINK_PING_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("invalid SPP_LINK_PING_MS: {}", ms))?;
            config.ping_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Backend settings for RFCOMM mode
    pub fn rfcomm(&self) -> RfcommConfig {
        RfcommConfig {
            adapter_name: self.adapter_name.clone(),
            mapping: match self.rfcomm_channel {
                Some(channel) => ChannelMapping::Fixed(channel),
                None => ChannelMapping::ServiceRecord,
            },
            ..Default::default()
        }
    }

    /// Next reconnection delay after `current` (exponential backoff)
    pub fn next_reconnect_delay(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max_reconnect_delay)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
