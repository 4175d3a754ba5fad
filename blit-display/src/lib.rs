//! # blit-display: network frame display
//!
//! Accepts RGB565 frames and `blit_config` control messages over HTTP
//! and WebSocket, hands them to the `blit-core` ingestion pipeline, and
//! renders them on a framebuffer device (or an in-memory surface when
//! running headless).

pub mod config;
pub mod server;
pub mod surface;
