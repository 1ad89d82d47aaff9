use crate::transport::ServiceSocket;
use std::io;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A connected socket together with its byte stream
pub(crate) struct Channel<S: ServiceSocket> {
    socket: S,
    stream: S::Stream,
    generation: u64,
}

impl<S: ServiceSocket> Channel<S> {
    pub(crate) fn new(socket: S, stream: S::Stream, generation: u64) -> Self {
        Self {
            socket,
            stream,
            generation,
        }
    }

    /// Which `connect` produced this channel
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Write one byte and push it to the transport
    pub(crate) async fn write_unit(&mut self, unit: u8) -> io::Result<()> {
        self.write_payload(&[unit]).await
    }

    /// Write `payload` and flush; both must succeed
    pub(crate) async fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    /// Shut the stream down and release the socket. Errors are logged only.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            warn!("[LINK] Stream shutdown failed: {}", e);
        }
        drop(self.stream);
        if let Err(e) = self.socket.close().await {
            warn!("[LINK] Unable to close socket: {:#}", e);
        }
    }
}

/// Connection state; connected exactly when a channel is held
pub(crate) enum LinkState<S: ServiceSocket> {
    Disconnected,
    Connected(Channel<S>),
}

impl<S: ServiceSocket> LinkState<S> {
    pub(crate) fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected(_))
    }

    pub(crate) fn channel_mut(&mut self) -> Option<&mut Channel<S>> {
        match self {
            LinkState::Connected(channel) => Some(channel),
            LinkState::Disconnected => None,
        }
    }

    /// Move the channel out, leaving `Disconnected`
    pub(crate) fn take(&mut self) -> Option<Channel<S>> {
        match std::mem::replace(self, LinkState::Disconnected) {
            LinkState::Connected(channel) => Some(channel),
            LinkState::Disconnected => None,
        }
    }
}
