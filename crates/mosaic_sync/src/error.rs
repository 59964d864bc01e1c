//! # Synchronization Error Types
//!
//! Fatal conditions abort the current tick; a buffer that simply does
//! not yet hold a complete message is never an error (those paths
//! return `Option`/`bool`).

use mosaic_core::{ComponentError, EntityError};
use thiserror::Error;

/// Fatal decode-path errors.
///
/// An unknown kind is deliberately not skipped: silently dropping a
/// framed message would let replicas diverge on what they have applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A complete frame carries a kind this replica does not recognize.
    #[error("unknown wire message kind {kind} at offset {offset}")]
    UnknownMessageKind {
        /// The raw kind field.
        kind: u32,
        /// Read offset of the frame start inside the chunk.
        offset: usize,
    },

    /// A frame's declared length is too small to hold its kind's fixed
    /// fields.
    #[error("wire message of kind {kind} malformed: declared {declared} bytes")]
    MalformedBody {
        /// The raw kind field.
        kind: u32,
        /// The declared frame length.
        declared: u32,
    },
}

/// Any error the synchronization layer can surface to the caller.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Entity allocation or reconciliation failed.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Component registration, lookup, or codec failure.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// Decode-path protocol violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A transport failed to accept an outgoing flush.
    #[error("transport `{transport}` failed to send: {detail}")]
    TransportSend {
        /// The transport's identity string.
        transport: String,
        /// What the transport reported.
        detail: String,
    },

    /// The synchronization configuration could not be parsed or applied.
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),
}
