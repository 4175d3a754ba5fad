//! Output surfaces for the render thread.
//!
//! Frames are composed in a [`MemorySurface`] and, when a framebuffer
//! device is configured, the whole RGB565 image is written to it after
//! each blit.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{info, warn};

use blit_core::{DisplayError, DisplaySurface, MemorySurface, Placement};

use crate::config::PanelConfig;

// ── FbdevSurface ─────────────────────────────────────────────────

/// RGB565 framebuffer device (`/dev/fbN` or any seekable file).
pub struct FbdevSurface {
    canvas: MemorySurface,
    device: File,
}

impl FbdevSurface {
    /// Open `path` for writing and clear it to black.
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, DisplayError> {
        if width == 0 || height == 0 {
            return Err(DisplayError::InvalidGeometry { width, height });
        }
        let device = OpenOptions::new().write(true).create(false).open(path)?;
        let mut surface = Self {
            canvas: MemorySurface::new(width, height),
            device,
        };
        surface.flush()?;
        Ok(surface)
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.device.seek(SeekFrom::Start(0))?;
        self.device.write_all(self.canvas.as_bytes())?;
        self.device.flush()?;
        Ok(())
    }
}

impl DisplaySurface for FbdevSurface {
    fn resolution(&self) -> (u32, u32) {
        self.canvas.resolution()
    }

    fn blit(
        &mut self,
        frame: &[u8],
        width: u16,
        height: u16,
        placement: Placement,
    ) -> Result<(), DisplayError> {
        self.canvas.blit(frame, width, height, placement)?;
        self.flush()
    }
}

// ── PanelSurface ─────────────────────────────────────────────────

/// The surface selected by configuration.
pub enum PanelSurface {
    /// Headless: frames are composed but not shown anywhere.
    Memory(MemorySurface),
    Fbdev(FbdevSurface),
}

impl PanelSurface {
    /// Build the configured surface. A device that cannot be opened
    /// degrades to a headless surface rather than failing start-up.
    pub fn from_config(panel: &PanelConfig) -> Self {
        if panel.device.is_empty() {
            info!("no panel device configured; rendering headless {}x{}", panel.width, panel.height);
            return PanelSurface::Memory(MemorySurface::new(panel.width, panel.height));
        }

        match FbdevSurface::open(Path::new(&panel.device), panel.width, panel.height) {
            Ok(fb) => {
                info!("display initialised: {} ({}x{})", panel.device, panel.width, panel.height);
                PanelSurface::Fbdev(fb)
            }
            Err(e) => {
                warn!("failed to open {}: {e}; rendering headless", panel.device);
                PanelSurface::Memory(MemorySurface::new(panel.width, panel.height))
            }
        }
    }
}

impl DisplaySurface for PanelSurface {
    fn resolution(&self) -> (u32, u32) {
        match self {
            PanelSurface::Memory(s) => s.resolution(),
            PanelSurface::Fbdev(s) => s.resolution(),
        }
    }

    fn blit(
        &mut self,
        frame: &[u8],
        width: u16,
        height: u16,
        placement: Placement,
    ) -> Result<(), DisplayError> {
        match self {
            PanelSurface::Memory(s) => s.blit(frame, width, height, placement),
            PanelSurface::Fbdev(s) => s.blit(frame, width, height, placement),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_device(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("blit-fb-{name}-{}", std::process::id()));
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn fbdev_writes_whole_frame() {
        let path = temp_device("write");
        let mut fb = FbdevSurface::open(&path, 4, 2).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 16]);

        let frame = 0xF800u16.to_le_bytes().repeat(4);
        let p = Placement::fit(fb.resolution(), (2, 2)).unwrap();
        fb.blit(&frame, 2, 2, p).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 16);
        // Row 0: black, red, red, black.
        assert_eq!(&written[0..8], &[0, 0, 0x00, 0xF8, 0x00, 0xF8, 0, 0]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_device_degrades_to_memory() {
        let panel = PanelConfig {
            width: 8,
            height: 8,
            device: "/nonexistent/fb0".into(),
        };
        let surface = PanelSurface::from_config(&panel);
        assert!(matches!(surface, PanelSurface::Memory(_)));
        assert_eq!(surface.resolution(), (8, 8));
    }

    #[test]
    fn empty_device_is_headless() {
        let surface = PanelSurface::from_config(&PanelConfig::default());
        assert!(matches!(surface, PanelSurface::Memory(_)));
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let path = temp_device("zero");
        assert!(matches!(
            FbdevSurface::open(&path, 0, 10),
            Err(DisplayError::InvalidGeometry { .. })
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
