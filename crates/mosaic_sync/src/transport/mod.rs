//! # Transport Layer
//!
//! The boundary between the tick loop and the outside world. A transport
//! is any bidirectional byte channel: the engine drains inbound chunks
//! at the start of a tick and flushes one concatenated chunk per
//! transport at the end.
//!
//! ## Design
//!
//! - Pull-based ingress: bytes a peer delivered between ticks buffer in
//!   the transport and are consumed only by `poll` at the next tick
//! - One `send` per tick per transport, all messages concatenated
//! - An egress `filter` lets a transport opt out of individual messages
//!   (a renderer channel that only wants transforms, a relay that drops
//!   its own echoes)

use crate::error::SyncError;
use crate::protocol::MessageKind;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use mosaic_core::{ComponentId, EntityId};

/// The egress-filter view of one outgoing message.
#[derive(Clone, Copy, Debug)]
pub struct FilterInfo {
    /// The wire kind.
    pub kind: MessageKind,
    /// Target entity.
    pub entity: EntityId,
    /// Target component; `None` for whole-entity messages.
    pub component: Option<ComponentId>,
    /// Logical timestamp; 0 for whole-entity messages.
    pub timestamp: u64,
}

/// A bidirectional byte channel attached to the engine.
pub trait Transport {
    /// Identity string, used for logs and resend targeting.
    fn label(&self) -> &str;

    /// Flushes one chunk of concatenated messages to the peer.
    ///
    /// # Errors
    ///
    /// [`SyncError::TransportSend`] when the channel is gone.
    fn send(&mut self, bytes: &[u8]) -> Result<(), SyncError>;

    /// Takes the next buffered inbound chunk, if any. Non-blocking.
    fn poll(&mut self) -> Option<Vec<u8>>;

    /// Whether this transport wants the given outgoing message.
    fn filter(&self, message: &FilterInfo) -> bool {
        let _ = message;
        true
    }
}

/// Counters for one memory transport endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportStats {
    /// Chunks flushed out.
    pub chunks_sent: u64,
    /// Bytes flushed out.
    pub bytes_sent: u64,
    /// Chunks drained in.
    pub chunks_received: u64,
    /// Bytes drained in.
    pub bytes_received: u64,
}

/// Egress predicate for a [`MemoryTransport`].
pub type FilterFn = Box<dyn Fn(&FilterInfo) -> bool>;

/// In-process loopback transport over crossbeam channels.
///
/// [`MemoryTransport::pair`] yields two connected endpoints; bytes sent
/// on one buffer in the other until polled. Used by tests and by local
/// editor wiring.
pub struct MemoryTransport {
    label: String,
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
    filter: Option<FilterFn>,
    stats: TransportStats,
}

impl MemoryTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = unbounded();
        let (right_tx, right_rx) = unbounded();
        (
            Self::endpoint("memory:a", left_tx, right_rx),
            Self::endpoint("memory:b", right_tx, left_rx),
        )
    }

    fn endpoint(label: &str, outbound: Sender<Vec<u8>>, inbound: Receiver<Vec<u8>>) -> Self {
        Self {
            label: label.to_owned(),
            outbound,
            inbound,
            filter: None,
            stats: TransportStats::default(),
        }
    }

    /// Replaces the egress filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&FilterInfo) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Replaces the identity label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Traffic counters for this endpoint.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

impl Transport for MemoryTransport {
    fn label(&self) -> &str {
        &self.label
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SyncError> {
        self.stats.chunks_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| SyncError::TransportSend {
                transport: self.label.clone(),
                detail: "peer endpoint dropped".to_owned(),
            })
    }

    fn poll(&mut self) -> Option<Vec<u8>> {
        match self.inbound.try_recv() {
            Ok(chunk) => {
                self.stats.chunks_received += 1;
                self.stats.bytes_received += chunk.len() as u64;
                Some(chunk)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    fn filter(&self, message: &FilterInfo) -> bool {
        self.filter.as_ref().map_or(true, |f| f(message))
    }
}
