//! # blit-core
//!
//! Frame ingestion pipeline for a network-fed RGB565 display.
//!
//! This crate contains:
//! - **Dimensions**: `infer` guesses frame geometry from a byte count
//! - **Channel**: `FrameChannel`, the bounded drop-newest hand-off to the render thread
//! - **Session**: `SessionConfig`, the geometry announced by the sender
//! - **Message**: text/binary classification and control-message parsing
//! - **Ingest**: `IngestHandler`, transport bytes in, frame items out
//! - **Render**: `RenderConsumer`, the `DisplaySurface` trait and a software surface
//! - **Watchdog**: liveness keepalive for the render loop
//! - **Error**: `IngestError`, `DisplayError`, `BlitError`, all `thiserror`-based

pub mod channel;
pub mod dimensions;
pub mod error;
pub mod ingest;
pub mod message;
pub mod render;
pub mod session;
pub mod watchdog;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{
    FRAME_QUEUE_CAPACITY, FrameChannel, FrameItem, FramePayload, FramePublisher, FrameReceiver,
    PublishError,
};
pub use dimensions::{DEFAULT_DIMENSIONS, infer};
pub use error::{BlitError, DisplayError, ErrorKind, IngestError};
pub use ingest::{IngestHandler, Ingested, Resolution, StatsSnapshot};
pub use message::{ControlMessage, MessageKind, classify};
pub use render::{
    DisplaySurface, Liveness, MemorySurface, Placement, RenderConsumer, RenderOutcome,
};
pub use session::{SessionCell, SessionConfig};
pub use watchdog::{StallAction, Watchdog};
