//! Link setup errors
//!
//! These never cross the `LinkManager` boundary; they are logged and
//! collapsed into a failed `connect`.

use thiserror::Error;

/// Reasons a connection attempt failed
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no local adapter present")]
    AdapterUnavailable,

    #[error("peer handle resolution failed: {0:#}")]
    Resolve(#[source] anyhow::Error),

    #[error("channel open failed: {0:#}")]
    OpenChannel(#[source] anyhow::Error),

    #[error("connect failed: {0:#}")]
    Connect(#[source] anyhow::Error),

    #[error("stream acquisition failed: {0:#}")]
    AcquireStream(#[source] anyhow::Error),
}

impl LinkError {
    /// Setup step that failed, for log fields
    pub fn step(&self) -> &'static str {
        match self {
            LinkError::AdapterUnavailable => "adapter",
            LinkError::Resolve(_) => "resolve",
            LinkError::OpenChannel(_) => "open",
            LinkError::Connect(_) => "connect",
            LinkError::AcquireStream(_) => "stream",
        }
    }
}
