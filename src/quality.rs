//! Luminance-histogram degeneracy screen.
//!
//! A frame is worth classifying only when its luminance is spread out. The
//! screen decodes the payload, builds a 256-bin histogram over 8-bit luma,
//! and rejects the frame when a single bin holds more than 90% of the
//! pixels: a covered lens, a black night frame, or a washed-out sensor all
//! collapse into one bin. Undecodable or empty payloads are rejected the
//! same way. Producers and consumers both apply this screen, so the
//! classification must stay deterministic for identical bytes.

use image::GrayImage;

/// Fraction of pixels one luma bin may hold before the frame is degenerate.
pub const LUMA_DOMINANCE_LIMIT: f64 = 0.9;

/// Outcome of the screen. Exactly two: a frame is either worth classifying
/// or it is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameQuality {
    Usable,
    Degenerate(DegenerateKind),
}

impl FrameQuality {
    pub fn is_usable(&self) -> bool {
        matches!(self, FrameQuality::Usable)
    }
}

/// Why a frame was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegenerateKind {
    /// The payload did not decode as an image.
    Undecodable,
    /// The decoded image has no pixels.
    Empty,
    /// One luminance bin dominates the histogram.
    FlatLuminance,
}

impl std::fmt::Display for DegenerateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegenerateKind::Undecodable => write!(f, "undecodable payload"),
            DegenerateKind::Empty => write!(f, "empty image"),
            DegenerateKind::FlatLuminance => write!(f, "flat luminance"),
        }
    }
}

/// Screen an encoded image payload.
pub fn assess(payload: &[u8]) -> FrameQuality {
    let decoded = match image::load_from_memory(payload) {
        Ok(img) => img,
        Err(_) => return FrameQuality::Degenerate(DegenerateKind::Undecodable),
    };
    assess_gray(&decoded.to_luma8())
}

/// Screen an already-decoded luma image.
pub fn assess_gray(img: &GrayImage) -> FrameQuality {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    assess_histogram(&histogram)
}

/// Screen a luma histogram directly. The decision rule lives here: zero
/// pixels reject, and a single bin above `LUMA_DOMINANCE_LIMIT` rejects.
pub fn assess_histogram(histogram: &[u64; 256]) -> FrameQuality {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return FrameQuality::Degenerate(DegenerateKind::Empty);
    }
    let dominant = histogram.iter().copied().max().unwrap_or(0);
    if dominant as f64 / total as f64 > LUMA_DOMINANCE_LIMIT {
        return FrameQuality::Degenerate(DegenerateKind::FlatLuminance);
    }
    FrameQuality::Usable
}
