//! Session geometry announced by the sender.
//!
//! The ingestion handler is the only writer. It replaces the whole
//! value at once through a `watch` channel, so any observer sees either
//! the old geometry or the new one, never a mix. The render consumer
//! does not read this cell; it learns about geometry changes from
//! `Config` items on the frame channel.

use serde::Serialize;
use tokio::sync::watch;

use crate::dimensions::expected_bytes;

// ── SessionConfig ────────────────────────────────────────────────

/// Last-known, externally declared frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionConfig {
    pub width: u16,
    pub height: u16,
    pub configured: bool,
}

impl SessionConfig {
    /// A configured session of `width × height`.
    pub const fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            configured: true,
        }
    }

    /// Nothing announced yet.
    pub const fn unconfigured() -> Self {
        Self {
            width: 0,
            height: 0,
            configured: false,
        }
    }

    /// Configured with non-zero geometry.
    pub fn is_usable(&self) -> bool {
        self.configured && self.width > 0 && self.height > 0
    }

    /// Byte count a frame of the configured geometry would have.
    pub fn expected_bytes(&self) -> u32 {
        expected_bytes(self.width, self.height)
    }

    /// Whether a payload of `len` bytes fits the configured geometry exactly.
    pub fn matches(&self, len: usize) -> bool {
        self.is_usable() && u32::try_from(len).is_ok_and(|l| l == self.expected_bytes())
    }
}

// ── SessionCell ──────────────────────────────────────────────────

/// Single-writer cell holding the current [`SessionConfig`].
#[derive(Debug)]
pub struct SessionCell {
    tx: watch::Sender<SessionConfig>,
}

impl SessionCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionConfig::unconfigured());
        Self { tx }
    }

    /// Current value.
    pub fn get(&self) -> SessionConfig {
        *self.tx.borrow()
    }

    /// Replace the whole configuration, returning the previous value.
    pub fn replace(&self, config: SessionConfig) -> SessionConfig {
        self.tx.send_replace(config)
    }

    /// Observe future replacements.
    pub fn subscribe(&self) -> watch::Receiver<SessionConfig> {
        self.tx.subscribe()
    }
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
