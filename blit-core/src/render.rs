//! Render consumer and the display-surface seam.
//!
//! The consumer owns the receiving end of the frame channel and runs on
//! its own OS thread. Config items update its private copy of the
//! session; payload items are scaled (never up), centered and blitted.
//! Every payload buffer is dropped after its single pass, whether the
//! blit succeeded or not.

use tracing::{debug, info, warn};

use crate::channel::{FrameItem, FramePayload, FrameReceiver};
use crate::dimensions::expected_bytes;
use crate::error::DisplayError;
use crate::session::SessionConfig;

// ── Placement ────────────────────────────────────────────────────

/// Where a frame lands on the surface after uniform scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Uniform scale factor, at most 1.0.
    pub scale: f64,
}

impl Placement {
    /// Fit a `frame` into `surface`, preserving aspect ratio, never
    /// upscaling, centered.
    pub fn fit(surface: (u32, u32), frame: (u16, u16)) -> Result<Self, DisplayError> {
        let (sw, sh) = surface;
        let (fw, fh) = (u32::from(frame.0), u32::from(frame.1));
        if sw == 0 || sh == 0 {
            return Err(DisplayError::InvalidGeometry { width: sw, height: sh });
        }
        if fw == 0 || fh == 0 {
            return Err(DisplayError::InvalidGeometry { width: fw, height: fh });
        }

        let scale_x = f64::from(sw) / f64::from(fw);
        let scale_y = f64::from(sh) / f64::from(fh);
        let scale = scale_x.min(scale_y).min(1.0);

        let width = ((f64::from(fw) * scale) as u32).clamp(1, sw);
        let height = ((f64::from(fh) * scale) as u32).clamp(1, sh);

        Ok(Self {
            x: (sw - width) / 2,
            y: (sh - height) / 2,
            width,
            height,
            scale,
        })
    }
}

// ── DisplaySurface ───────────────────────────────────────────────

/// A drawable RGB565 output.
pub trait DisplaySurface {
    /// Pixel resolution `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Draw `frame` (RGB565, `width × height`, possibly short or long)
    /// into the `placement` rectangle, replacing what was shown before.
    fn blit(
        &mut self,
        frame: &[u8],
        width: u16,
        height: u16,
        placement: Placement,
    ) -> Result<(), DisplayError>;
}

/// Software RGB565 framebuffer.
///
/// Blits clear to black and nearest-neighbour sample the source frame.
/// Source pixels past the end of a short buffer are drawn black.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 2],
        }
    }

    /// Raw RGB565 bytes, row-major, little-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 2;
        let px = self.pixels.get(i..i + 2)?;
        Some(u16::from_le_bytes([px[0], px[1]]))
    }

    /// Fill the whole surface with black.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }
}

impl DisplaySurface for MemorySurface {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn blit(
        &mut self,
        frame: &[u8],
        width: u16,
        height: u16,
        placement: Placement,
    ) -> Result<(), DisplayError> {
        let (fw, fh) = (width as usize, height as usize);
        if fw == 0 || fh == 0 {
            return Err(DisplayError::InvalidGeometry {
                width: width.into(),
                height: height.into(),
            });
        }
        let right = placement.x.checked_add(placement.width);
        let bottom = placement.y.checked_add(placement.height);
        let inside = matches!((right, bottom), (Some(r), Some(b)) if r <= self.width && b <= self.height);
        if !inside {
            return Err(DisplayError::InvalidGeometry {
                width: placement.width,
                height: placement.height,
            });
        }

        self.clear();

        let (pw, ph) = (placement.width as usize, placement.height as usize);
        let stride = self.width as usize;
        for dy in 0..ph {
            let sy = dy * fh / ph;
            let row = (placement.y as usize + dy) * stride + placement.x as usize;
            for dx in 0..pw {
                let sx = dx * fw / pw;
                let src = (sy * fw + sx) * 2;
                let dst = (row + dx) * 2;
                if let (Some(s), Some(d)) = (frame.get(src..src + 2), self.pixels.get_mut(dst..dst + 2)) {
                    d.copy_from_slice(s);
                }
            }
        }
        Ok(())
    }
}

// ── Liveness ─────────────────────────────────────────────────────

/// Keepalive the consumer refreshes once per loop iteration.
pub trait Liveness {
    fn refresh(&self);
}

/// For callers that have no watchdog.
impl Liveness for () {
    fn refresh(&self) {}
}

// ── RenderConsumer ───────────────────────────────────────────────

/// What processing one item did.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// Session geometry updated; nothing drawn.
    Configured(SessionConfig),
    /// Frame drawn. `mismatch` is set when the byte count did not equal
    /// `width * height * 2`.
    Rendered { placement: Placement, mismatch: bool },
    /// Zero-length payload; nothing drawn.
    Skipped,
}

/// Drains the frame channel into a [`DisplaySurface`].
pub struct RenderConsumer<S, L> {
    receiver: FrameReceiver,
    surface: S,
    liveness: L,
    session: SessionConfig,
    rendered: u64,
}

impl<S: DisplaySurface, L: Liveness> RenderConsumer<S, L> {
    pub fn new(receiver: FrameReceiver, surface: S, liveness: L) -> Self {
        Self {
            receiver,
            surface,
            liveness,
            session: SessionConfig::unconfigured(),
            rendered: 0,
        }
    }

    /// Geometry last received through a `Config` item.
    pub fn session(&self) -> SessionConfig {
        self.session
    }

    /// Frames successfully blitted.
    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Process one item. The item, and with it any pixel buffer, is
    /// dropped before this returns regardless of the outcome.
    pub fn process(&mut self, item: FrameItem) -> Result<RenderOutcome, DisplayError> {
        match item {
            FrameItem::Config { width, height } => {
                self.session = SessionConfig::new(width, height);
                info!("config updated: {width}x{height}");
                Ok(RenderOutcome::Configured(self.session))
            }
            FrameItem::Payload(payload) => self.draw(payload),
        }
    }

    /// Block on the channel forever, processing items as they arrive.
    ///
    /// Only returns once every publisher has been dropped, handing the
    /// surface back.
    pub fn run(mut self) -> S {
        info!("frame display loop started");
        while let Some(item) = self.receiver.take() {
            if let Err(e) = self.process(item) {
                warn!("render failed: {e}");
            }
            self.liveness.refresh();
        }
        info!("frame channel closed; display loop exiting");
        self.surface
    }

    fn draw(&mut self, payload: FramePayload) -> Result<RenderOutcome, DisplayError> {
        let (width, height, size) = (payload.width(), payload.height(), payload.size());
        if size == 0 {
            return Ok(RenderOutcome::Skipped);
        }

        let expected = expected_bytes(width, height);
        let mismatch = size != expected;
        if mismatch {
            warn!("frame size mismatch: got {size} bytes, expected {expected} for {width}x{height}");
        }

        let placement = Placement::fit(self.surface.resolution(), (width, height))?;
        debug!(
            "processing frame: {size} bytes, {width}x{height} scaled to {}x{} at ({},{})",
            placement.width, placement.height, placement.x, placement.y
        );
        self.surface.blit(payload.buffer(), width, height, placement)?;
        self.rendered += 1;

        Ok(RenderOutcome::Rendered {
            placement,
            mismatch,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{FrameChannel, FramePayload};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Liveness for Counter {
        fn refresh(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A surface whose blits always fail.
    struct BrokenSurface;

    impl DisplaySurface for BrokenSurface {
        fn resolution(&self) -> (u32, u32) {
            (100, 100)
        }

        fn blit(&mut self, _: &[u8], _: u16, _: u16, _: Placement) -> Result<(), DisplayError> {
            Err(DisplayError::Io(std::io::Error::other("panel offline")))
        }
    }

    fn solid(width: u16, height: u16, color: u16) -> Vec<u8> {
        color
            .to_le_bytes()
            .repeat(width as usize * height as usize)
    }

    #[test]
    fn placement_never_upscales() {
        let p = Placement::fit((720, 1280), (320, 240)).unwrap();
        assert_eq!(p.scale, 1.0);
        assert_eq!((p.width, p.height), (320, 240));
        assert_eq!((p.x, p.y), (200, 520));
    }

    #[test]
    fn placement_downscales_uniformly() {
        let p = Placement::fit((640, 480), (1280, 720)).unwrap();
        assert_eq!(p.scale, 0.5);
        assert_eq!((p.width, p.height), (640, 360));
        assert_eq!((p.x, p.y), (0, 60));
    }

    #[test]
    fn placement_rejects_degenerate() {
        assert!(Placement::fit((0, 480), (320, 240)).is_err());
        assert!(Placement::fit((640, 480), (0, 240)).is_err());
    }

    #[test]
    fn memory_surface_blit_centers_frame() {
        let mut s = MemorySurface::new(8, 8);
        let frame = solid(4, 2, 0xF800);
        let p = Placement::fit(s.resolution(), (4, 2)).unwrap();
        s.blit(&frame, 4, 2, p).unwrap();

        assert_eq!((p.x, p.y), (2, 3));
        assert_eq!(s.pixel(2, 3), Some(0xF800));
        assert_eq!(s.pixel(5, 4), Some(0xF800));
        assert_eq!(s.pixel(1, 3), Some(0));
        assert_eq!(s.pixel(2, 5), Some(0));
        assert_eq!(s.pixel(8, 0), None);
    }

    #[test]
    fn memory_surface_rejects_out_of_bounds_placement() {
        let mut surface = MemorySurface::new(8, 8);
        let frame = solid(2, 2, 0xFFFF);
        let overflowing = Placement {
            x: u32::MAX,
            y: 0,
            width: 2,
            height: 2,
            scale: 1.0,
        };
        assert!(matches!(
            surface.blit(&frame, 2, 2, overflowing),
            Err(DisplayError::InvalidGeometry { .. })
        ));

        let outside = Placement {
            x: 0,
            y: 7,
            width: 2,
            height: 2,
            scale: 1.0,
        };
        assert!(matches!(
            surface.blit(&frame, 2, 2, outside),
            Err(DisplayError::InvalidGeometry { .. })
        ));
        assert_eq!(surface.pixel(0, 7), Some(0));
    }

    #[test]
    fn memory_surface_short_buffer_draws_black_tail() {
        let mut s = MemorySurface::new(4, 4);
        // Only the first row of a 4x4 frame.
        let frame = solid(4, 1, 0x07E0);
        let p = Placement::fit(s.resolution(), (4, 4)).unwrap();
        s.blit(&frame, 4, 4, p).unwrap();
        assert_eq!(s.pixel(3, 0), Some(0x07E0));
        assert_eq!(s.pixel(0, 1), Some(0));
    }

    #[test]
    fn memory_surface_downsamples() {
        let mut s = MemorySurface::new(2, 2);
        // 4x4 frame: left half red, right half blue.
        let mut frame = Vec::new();
        for _ in 0..4 {
            frame.extend(solid(2, 1, 0xF800));
            frame.extend(solid(2, 1, 0x001F));
        }
        let p = Placement::fit(s.resolution(), (4, 4)).unwrap();
        s.blit(&frame, 4, 4, p).unwrap();
        assert_eq!(s.pixel(0, 0), Some(0xF800));
        assert_eq!(s.pixel(1, 1), Some(0x001F));
    }

    #[test]
    fn config_updates_consumer_session_without_drawing() {
        let (_tx, rx) = FrameChannel::new();
        let mut c = RenderConsumer::new(rx, MemorySurface::new(4, 4), ());
        let out = c
            .process(FrameItem::Config {
                width: 320,
                height: 240,
            })
            .unwrap();
        assert_eq!(out, RenderOutcome::Configured(SessionConfig::new(320, 240)));
        assert_eq!(c.session(), SessionConfig::new(320, 240));
        assert_eq!(c.rendered(), 0);

        // Applying the same config twice leaves identical state.
        c.process(FrameItem::Config {
            width: 320,
            height: 240,
        })
        .unwrap();
        assert_eq!(c.session(), SessionConfig::new(320, 240));
    }

    #[test]
    fn mismatched_payload_still_renders() {
        let (_tx, rx) = FrameChannel::new();
        let mut c = RenderConsumer::new(rx, MemorySurface::new(16, 16), ());
        let payload = FramePayload::new(vec![0xFF; 10], 4, 4);
        let out = c.process(FrameItem::Payload(payload)).unwrap();
        assert!(matches!(out, RenderOutcome::Rendered { mismatch: true, .. }));
        assert_eq!(c.rendered(), 1);
    }

    #[test]
    fn empty_payload_is_skipped() {
        let (_tx, rx) = FrameChannel::new();
        let mut c = RenderConsumer::new(rx, MemorySurface::new(4, 4), ());
        let out = c
            .process(FrameItem::Payload(FramePayload::new(Vec::new(), 4, 4)))
            .unwrap();
        assert_eq!(out, RenderOutcome::Skipped);
    }

    #[test]
    fn failed_blit_is_reported_and_loop_continues() {
        let (tx, rx) = FrameChannel::new();
        let counter = Counter::default();
        let consumer = RenderConsumer::new(rx, BrokenSurface, counter.clone());

        tx.publish(FrameItem::Payload(FramePayload::new(vec![1; 8], 2, 2)))
            .unwrap();
        tx.publish(FrameItem::Payload(FramePayload::new(vec![1; 8], 2, 2)))
            .unwrap();
        drop(tx);

        let handle = std::thread::spawn(move || consumer.run());
        handle.join().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_drains_until_closed() {
        let (tx, rx) = FrameChannel::new();
        let counter = Counter::default();
        let consumer = RenderConsumer::new(rx, MemorySurface::new(4, 4), counter.clone());

        tx.publish(FrameItem::Config { width: 2, height: 2 }).unwrap();
        tx.publish(FrameItem::Payload(FramePayload::new(solid(2, 2, 0xFFFF), 2, 2)))
            .unwrap();
        drop(tx);

        let surface = std::thread::spawn(move || consumer.run()).join().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert_eq!(surface.pixel(1, 1), Some(0xFFFF));
        assert_eq!(surface.pixel(0, 0), Some(0));
    }
}
