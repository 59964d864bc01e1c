//! # MOSAIC Sync - The Convergence Protocol
//!
//! Conflict-free replication of scene state across peers.
//!
//! ## Architecture
//!
//! This crate implements the complete synchronization stack for MOSAIC:
//!
//! - **Protocol**: framed little-endian binary operations
//! - **Register**: last-write-wins cells with deterministic tie-breaks
//! - **Transports**: pluggable byte channels, drained and flushed once
//!   per tick
//! - **Engine**: the tick orchestrator driving receive / resolve /
//!   systems / broadcast
//!
//! ## Convergence Guarantees
//!
//! - Replicas that see the same writes agree on every key, regardless
//!   of delivery order or duplication
//! - A stale writer is answered with the authoritative value, so losses
//!   heal themselves at the cost of a round trip
//! - Rejected writes are a normal outcome of concurrent editing, never
//!   an error
//!
//! ## Example
//!
//! ```rust,ignore
//! use mosaic_sync::{SceneEngine, SyncConfig};
//!
//! let mut engine = SceneEngine::new(SyncConfig::default())?;
//! engine.define_component(TRANSFORM, "transform", codec)?;
//! engine.add_transport(transport);
//! engine.update(dt)?; // one full tick
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod crdt;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::{RangeConfig, SyncConfig};
pub use crdt::{CrdtEvent, CrdtKey, LwwEntry, LwwRegister, WriteOutcome};
pub use engine::{SceneEngine, SystemFn};
pub use error::{ProtocolError, SyncError};
pub use protocol::{CrdtMessage, MessageKind, WireHeader};
pub use transport::{FilterInfo, MemoryTransport, Transport, TransportStats};
