//! Domain-specific error types for the blit pipeline.
//!
//! Every discard or fallback point in the ingestion path maps to a
//! named [`IngestError`] variant so callers and tests can assert on the
//! classification instead of log text. Nothing here is fatal: the
//! pipeline degrades (dropped frame, stale display) rather than exits.

use std::time::Duration;
use thiserror::Error;

/// Top-level error for process wiring: config, bring-up and display I/O.
#[derive(Debug, Error)]
pub enum BlitError {
    /// Underlying socket or file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The display surface rejected an operation.
    #[error("display error: {0}")]
    Display(#[from] DisplayError),

    /// A bounded wait expired.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

// ── IngestError ──────────────────────────────────────────────────

/// Broad classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected under normal operation: full queue, unparsable control
    /// message, empty read. The message is discarded.
    Transient,
    /// A control message tried to set geometry that cannot be used.
    ConfigurationAbsent,
    /// The payload buffer could not be allocated.
    ResourceExhausted,
}

/// Why an inbound message did not reach the render consumer.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Zero-length message.
    #[error("empty message")]
    Empty,

    /// Text that is neither a ping nor valid JSON.
    #[error("malformed control message: {0}")]
    Malformed(String),

    /// Valid JSON with a `type` the handler does not act on.
    #[error("unknown control message type: {0}")]
    UnknownControl(String),

    /// A `blit_config` whose width/height cannot describe a frame.
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: String, height: String },

    /// The frame queue is at capacity; the frame was dropped.
    #[error("frame queue full, dropped {bytes} bytes")]
    ChannelFull { bytes: usize },

    /// The render consumer is gone.
    #[error("frame queue closed")]
    ChannelClosed,

    /// Copying the payload into an owned buffer failed.
    #[error("failed to allocate {bytes} bytes for frame")]
    AllocationFailed { bytes: usize },
}

impl IngestError {
    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidDimensions { .. } => ErrorKind::ConfigurationAbsent,
            IngestError::AllocationFailed { .. } => ErrorKind::ResourceExhausted,
            IngestError::Empty
            | IngestError::Malformed(_)
            | IngestError::UnknownControl(_)
            | IngestError::ChannelFull { .. }
            | IngestError::ChannelClosed => ErrorKind::Transient,
        }
    }
}

// ── DisplayError ─────────────────────────────────────────────────

/// Failure reported by a [`DisplaySurface`](crate::render::DisplaySurface).
#[derive(Debug, Error)]
pub enum DisplayError {
    /// Writing to the output device failed.
    #[error("display i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Frame or surface geometry is degenerate.
    #[error("invalid geometry: {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = IngestError::ChannelFull { bytes: 153600 };
        assert!(e.to_string().contains("153600"));

        let e = IngestError::InvalidDimensions {
            width: "0".into(),
            height: "240".into(),
        };
        assert_eq!(e.to_string(), "invalid frame dimensions: 0x240");
    }

    #[test]
    fn taxonomy() {
        assert_eq!(IngestError::Empty.kind(), ErrorKind::Transient);
        assert_eq!(
            IngestError::ChannelFull { bytes: 1 }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            IngestError::AllocationFailed { bytes: 1 }.kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            IngestError::InvalidDimensions {
                width: "x".into(),
                height: "y".into()
            }
            .kind(),
            ErrorKind::ConfigurationAbsent
        );
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BlitError = DisplayError::from(io_err).into();
        assert!(matches!(e, BlitError::Display(DisplayError::Io(_))));
    }

    #[test]
    fn config_message() {
        let e = BlitError::Config("listen_address \"x\": bad".into());
        assert_eq!(e.to_string(), "invalid configuration: listen_address \"x\": bad");
    }
}
