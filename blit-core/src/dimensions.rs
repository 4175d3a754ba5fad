//! Frame geometry inference from a raw byte count.
//!
//! Payload messages carry no header, so when the sender has not
//! announced its geometry we guess it: first from a table of common
//! resolutions, then by searching for the closest-to-square factor pair
//! of the pixel count.

use tracing::{debug, warn};

// ── Constants ────────────────────────────────────────────────────

/// RGB565: two bytes per pixel, fixed.
pub const BYTES_PER_PIXEL: u32 = 2;

/// Largest width or height the geometric search will accept.
pub const MAX_DIMENSION: u32 = 2048;

/// How many candidate widths below `sqrt(pixels)` are tried.
pub const SEARCH_WINDOW: u32 = 100;

/// Geometry used when nothing is configured and inference fails.
pub const DEFAULT_DIMENSIONS: (u16, u16) = (640, 480);

// ── Candidate table ──────────────────────────────────────────────

/// A well-known resolution and its RGB565 byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub width: u16,
    pub height: u16,
    pub bytes: u32,
}

impl Candidate {
    const fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            bytes: width as u32 * height as u32 * BYTES_PER_PIXEL,
        }
    }
}

/// Checked in order before the geometric search; first match wins.
pub const CANDIDATES: [Candidate; 7] = [
    Candidate::new(240, 240),
    Candidate::new(320, 240),
    Candidate::new(480, 320),
    Candidate::new(640, 480),
    Candidate::new(800, 600),
    Candidate::new(1024, 768),
    Candidate::new(1280, 720),
];

// ── Inference ────────────────────────────────────────────────────

/// Bytes an RGB565 frame of `width × height` occupies.
pub const fn expected_bytes(width: u16, height: u16) -> u32 {
    width as u32 * height as u32 * BYTES_PER_PIXEL
}

/// Infer `(width, height)` from a payload length.
///
/// Odd byte counts are truncated to whole pixels. Returns `None` for an
/// empty payload or when no factor pair within the search window fits
/// inside [`MAX_DIMENSION`].
pub fn infer(byte_count: u32) -> Option<(u16, u16)> {
    if let Some(c) = CANDIDATES.iter().find(|c| c.bytes == byte_count) {
        debug!("detected common dimension: {}x{} ({byte_count} bytes)", c.width, c.height);
        return Some((c.width, c.height));
    }

    let pixels = byte_count / BYTES_PER_PIXEL;
    if pixels == 0 {
        warn!("could not detect dimensions for {byte_count} bytes");
        return None;
    }

    let root = pixels.isqrt();
    let lowest = root.saturating_sub(SEARCH_WINDOW - 1).max(1);

    let found = (lowest..=root).rev().find_map(|w| {
        if pixels % w != 0 {
            return None;
        }
        let h = pixels / w;
        (w <= MAX_DIMENSION && h <= MAX_DIMENSION).then_some((w as u16, h as u16))
    });

    match found {
        Some((w, h)) => debug!("auto-detected dimension: {w}x{h} ({byte_count} bytes)"),
        None => warn!("could not detect dimensions for {byte_count} bytes"),
    }
    found
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entries_match_exactly() {
        for c in CANDIDATES {
            assert_eq!(infer(c.bytes), Some((c.width, c.height)), "{c:?}");
        }
    }

    #[test]
    fn table_byte_counts() {
        assert_eq!(CANDIDATES[0].bytes, 115_200);
        assert_eq!(CANDIDATES[5].bytes, 1_572_864);
        assert_eq!(CANDIDATES[6].bytes, 1_843_200);
    }

    #[test]
    fn qvga_is_a_table_hit() {
        assert_eq!(infer(153_600), Some((320, 240)));
    }

    #[test]
    fn zero_bytes_is_none() {
        assert_eq!(infer(0), None);
        // One byte is still zero whole pixels.
        assert_eq!(infer(1), None);
    }

    #[test]
    fn geometric_search_prefers_closest_to_square() {
        // 400x240 is not in the table; 96000 pixels factor as 300x320
        // first when walking down from isqrt(96000) = 309.
        assert_eq!(infer(192_000), Some((300, 320)));
    }

    #[test]
    fn perfect_square() {
        assert_eq!(infer(2 * 100 * 100), Some((100, 100)));
    }

    #[test]
    fn near_square_pairs_come_back_exactly() {
        // Each w is the largest divisor of w*h at or below isqrt(w*h).
        let pairs: [(u16, u16); 6] = [
            (100, 101),
            (123, 125),
            (250, 260),
            (480, 500),
            (1024, 1030),
            (2000, 2048),
        ];
        for (w, h) in pairs {
            let bytes = expected_bytes(w, h);
            assert!(CANDIDATES.iter().all(|c| c.bytes != bytes));

            let (iw, ih) = infer(bytes).unwrap();
            assert_eq!((iw, ih), (w, h), "{bytes} bytes");
            assert!(u32::from(iw) <= MAX_DIMENSION && u32::from(ih) <= MAX_DIMENSION);
        }
    }

    #[test]
    fn odd_count_truncates() {
        // 153601 misses the table, then searches 76800 pixels.
        assert_eq!(infer(153_601), Some((256, 300)));
    }

    #[test]
    fn small_frames_search_down_to_one() {
        // 7 pixels: isqrt = 2, window reaches w = 1.
        assert_eq!(infer(14), Some((1, 7)));
    }

    #[test]
    fn prime_pixel_count_outside_window_fails() {
        // 65537 is prime; no divisor in 157..=256.
        assert_eq!(infer(2 * 65_537), None);
        // 10007 is prime; only w = 1 divides and h exceeds the cap.
        assert_eq!(infer(2 * 10_007), None);
    }

    #[test]
    fn result_respects_dimension_cap() {
        for bytes in [2u32, 4_000, 76_800, 192_000, 5_000_000, 8_388_608] {
            if let Some((w, h)) = infer(bytes) {
                assert!(u32::from(w) <= MAX_DIMENSION && u32::from(h) <= MAX_DIMENSION);
                assert_eq!(expected_bytes(w, h), bytes / 2 * 2);
            }
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(infer(76_800), infer(76_800));
        assert_eq!(infer(76_800), Some((192, 200)));
    }
}
