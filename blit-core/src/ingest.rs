//! Ingestion handler: raw transport bytes in, frame items out.
//!
//! ```text
//! raw ──classify──► Text ──parse──► Ping ─────────────► Pong (reply)
//!                               └─► BlitConfig ──────► session + Config item
//!                               └─► other ───────────► logged, discarded
//!              └──► Binary ──resolve dims──► Payload item ──► FrameChannel
//! ```
//!
//! Nothing in here blocks. A full queue drops the frame on the spot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{FrameItem, FramePayload, FramePublisher, PublishError};
use crate::dimensions::{self, DEFAULT_DIMENSIONS};
use crate::error::IngestError;
use crate::message::{classify, ControlMessage, MessageKind, SensorValue};
use crate::session::{SessionCell, SessionConfig};

// ── Outcomes ─────────────────────────────────────────────────────

/// Where a payload's geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Session geometry, byte count matched.
    Configured,
    /// Inferred from the byte count (with or without a session).
    Inferred,
    /// Session geometry, byte count did not match and inference failed.
    StaleConfig,
    /// No session and inference failed: [`DEFAULT_DIMENSIONS`].
    Default,
}

/// Successful handling of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Frame queued for rendering.
    Queued {
        width: u16,
        height: u16,
        bytes: usize,
        resolution: Resolution,
    },
    /// Session geometry replaced and forwarded to the consumer.
    Configured { width: u16, height: u16 },
    /// Ping probe; the transport should reply `pong`.
    Pong,
    /// Recognised control message with nothing to act on.
    Informational,
}

/// Pick the geometry for a payload of `len` bytes.
pub fn resolve_dimensions(session: SessionConfig, len: usize) -> (u16, u16, Resolution) {
    let byte_count = u32::try_from(len).unwrap_or(u32::MAX);

    if session.is_usable() {
        if session.matches(len) {
            return (session.width, session.height, Resolution::Configured);
        }
        warn!(
            "frame size mismatch with config: got {len} bytes, expected {} for {}x{}",
            session.expected_bytes(),
            session.width,
            session.height
        );
        return match dimensions::infer(byte_count) {
            Some((w, h)) => (w, h, Resolution::Inferred),
            None => {
                warn!("could not detect dimensions, using config anyway");
                (session.width, session.height, Resolution::StaleConfig)
            }
        };
    }

    match dimensions::infer(byte_count) {
        Some((w, h)) => (w, h, Resolution::Inferred),
        None => {
            let (w, h) = DEFAULT_DIMENSIONS;
            warn!("unknown frame format: {len} bytes, falling back to {w}x{h}");
            (w, h, Resolution::Default)
        }
    }
}

// ── IngestStats ──────────────────────────────────────────────────

/// Counters updated by the handler; safe to read from any task.
#[derive(Debug, Default)]
pub struct IngestStats {
    messages: AtomicU64,
    frames_queued: AtomicU64,
    frames_dropped: AtomicU64,
    configs: AtomicU64,
    pings: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub frames_queued: u64,
    pub frames_dropped: u64,
    pub configs: u64,
    pub pings: u64,
    pub discarded: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            configs: self.configs.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ── IngestHandler ────────────────────────────────────────────────

/// Turns inbound transport messages into [`FrameItem`]s.
///
/// Shared across network tasks behind an `Arc`; it is the sole writer
/// of the session geometry.
#[derive(Debug)]
pub struct IngestHandler {
    publisher: FramePublisher,
    session: SessionCell,
    stats: IngestStats,
}

impl IngestHandler {
    pub fn new(publisher: FramePublisher) -> Self {
        Self {
            publisher,
            session: SessionCell::new(),
            stats: IngestStats::default(),
        }
    }

    /// Current session geometry.
    pub fn session(&self) -> SessionConfig {
        self.session.get()
    }

    /// The session cell, for observers.
    pub fn session_cell(&self) -> &SessionCell {
        &self.session
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Items waiting for the render consumer.
    pub fn backlog(&self) -> usize {
        self.publisher.pending()
    }

    /// Handle one inbound message.
    ///
    /// Errors are already logged; callers only need them to decide on a
    /// reply or to count.
    pub fn handle(&self, raw: &[u8]) -> Result<Ingested, IngestError> {
        if raw.is_empty() {
            return Err(IngestError::Empty);
        }
        let seq = self.stats.messages.fetch_add(1, Ordering::Relaxed) + 1;

        let result = match classify(raw) {
            MessageKind::Binary => {
                debug!("#{seq}: FRAME - {} bytes, head {}", raw.len(), hex_head(raw));
                self.handle_payload(raw)
            }
            MessageKind::Text => {
                debug!("#{seq}: TEXT - {} chars", raw.len());
                self.handle_text(raw)
            }
        };

        if let Err(e) = &result {
            IngestStats::bump(&self.stats.discarded);
            match e {
                IngestError::ChannelFull { .. } => warn!("#{seq}: frame queue full, dropping frame"),
                IngestError::UnknownControl(kind) => info!("#{seq}: ignoring JSON message: {kind}"),
                other => warn!("#{seq}: discarded: {other}"),
            }
        }
        result
    }

    // ── Internal ─────────────────────────────────────────────────

    fn handle_payload(&self, raw: &[u8]) -> Result<Ingested, IngestError> {
        let (width, height, resolution) = resolve_dimensions(self.session.get(), raw.len());

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(raw.len())
            .map_err(|_| IngestError::AllocationFailed { bytes: raw.len() })?;
        buffer.extend_from_slice(raw);

        let item = FrameItem::Payload(FramePayload::new(buffer, width, height));
        self.publish(item)?;

        IngestStats::bump(&self.stats.frames_queued);
        debug!("queued {width}x{height} frame ({} bytes, {resolution:?})", raw.len());
        Ok(Ingested::Queued {
            width,
            height,
            bytes: raw.len(),
            resolution,
        })
    }

    fn handle_text(&self, raw: &[u8]) -> Result<Ingested, IngestError> {
        let text = std::str::from_utf8(raw).map_err(|e| IngestError::Malformed(e.to_string()))?;

        match ControlMessage::parse(text)? {
            ControlMessage::Ping => {
                IngestStats::bump(&self.stats.pings);
                debug!("ping/pong");
                Ok(Ingested::Pong)
            }
            ControlMessage::BlitConfig(cfg) => {
                info!(
                    "blit config received: mode={:?} format={:?} size={:?} description={:?}",
                    cfg.mode, cfg.frame_format, cfg.frame_size, cfg.description
                );
                let Some((width, height)) = cfg.geometry else {
                    return Ok(Ingested::Informational);
                };
                self.session.replace(SessionConfig::new(width, height));
                IngestStats::bump(&self.stats.configs);
                info!("config updated: {width}x{height}");
                self.publish(FrameItem::Config { width, height })?;
                Ok(Ingested::Configured { width, height })
            }
            ControlMessage::ScreenConfig { screen_id } => {
                info!("screen config: screen_id={screen_id:?}");
                Ok(Ingested::Informational)
            }
            ControlMessage::Sensors(readings) => {
                for r in &readings {
                    match &r.value {
                        SensorValue::Display(v) => info!("sensor {} = {v}", r.name),
                        SensorValue::Number(v) => info!("sensor {} = {v:.2}", r.name),
                    }
                }
                Ok(Ingested::Informational)
            }
        }
    }

    fn publish(&self, item: FrameItem) -> Result<(), IngestError> {
        match self.publisher.publish(item) {
            Ok(()) => Ok(()),
            Err(PublishError::Full(item)) => {
                IngestStats::bump(&self.stats.frames_dropped);
                Err(IngestError::ChannelFull {
                    bytes: item.buffer_len(),
                })
            }
            Err(PublishError::Closed(_)) => Err(IngestError::ChannelClosed),
        }
    }
}

/// First eight bytes as space-separated hex.
fn hex_head(raw: &[u8]) -> String {
    raw.iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────
