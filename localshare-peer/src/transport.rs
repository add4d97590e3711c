use std::future::Future;

use localshare_core::{ChannelHandle, ConnectionHandle, FileMeta, PeerId, PeerRecord};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub id: PeerId,
    pub name: String,
}

impl DiscoveredPeer {
    pub fn new(id: impl Into<PeerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Cumulative state of a channel after one chunk went out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkReport {
    pub bytes_sent: u64,
    /// Percent of the file delivered so far, `0.0..=100.0`.
    pub progress: f64,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelHandle),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Everything the manager needs from a network backend.
///
/// The simulated backend and a real one are interchangeable behind this
/// contract. Implementations must not block the calling task.
pub trait Transport: Send + Sync + 'static {
    fn discover_peers(
        &self,
    ) -> impl Future<Output = Result<Vec<DiscoveredPeer>, TransportError>> + Send;

    fn open_channel(
        &self,
        peer: &PeerRecord,
        file: &FileMeta,
    ) -> impl Future<Output = Result<ChannelHandle, TransportError>> + Send;

    fn send_chunk(
        &self,
        channel: ChannelHandle,
    ) -> impl Future<Output = Result<ChunkReport, TransportError>> + Send;

    fn close_channel(
        &self,
        channel: ChannelHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Peer-level connections are optional; backends without them keep the
    /// default no-op.
    fn close_connection(
        &self,
        connection: ConnectionHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let _ = connection;
        std::future::ready(Ok(()))
    }
}
