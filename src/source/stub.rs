//! Synthetic frames for development and tests.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::io::Cursor;

const STUB_WIDTH: u32 = 320;
const STUB_HEIGHT: u32 = 240;

enum StubPattern {
    /// Gradient backdrop with a bright block that drifts between frames.
    Scene,
    /// Uniform mid-gray. Every frame is degenerate on purpose.
    Flat,
}

pub(crate) struct StubScene {
    pattern: StubPattern,
    frame_index: u64,
}

impl StubScene {
    pub(crate) fn new(pattern: &str) -> Result<Self> {
        let pattern = match pattern {
            "" | "scene" => StubPattern::Scene,
            "flat" => StubPattern::Flat,
            other => {
                return Err(anyhow!(
                    "unknown stub pattern '{}': expected 'scene' or 'flat'",
                    other
                ))
            }
        };
        Ok(Self {
            pattern,
            frame_index: 0,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Vec<u8>> {
        let image = match self.pattern {
            StubPattern::Scene => render_scene(self.frame_index),
            StubPattern::Flat => RgbImage::from_pixel(STUB_WIDTH, STUB_HEIGHT, Rgb([128, 128, 128])),
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        encode_jpeg(image)
    }
}

fn render_scene(frame_index: u64) -> RgbImage {
    // The block wanders on a fixed circuit so consecutive frames differ.
    let phase = (frame_index % 60) as u32;
    let block_x = 20 + phase * 4;
    let block_y = 40 + (phase % 30) * 5;
    RgbImage::from_fn(STUB_WIDTH, STUB_HEIGHT, |x, y| {
        let in_block = x >= block_x && x < block_x + 48 && y >= block_y && y < block_y + 48;
        if in_block {
            Rgb([250, 180, 40])
        } else {
            let r = (x * 255 / STUB_WIDTH) as u8;
            let g = (y * 255 / STUB_HEIGHT) as u8;
            Rgb([r, g, 96])
        }
    })
}

fn encode_jpeg(image: RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .context("failed to encode stub frame as JPEG")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_valid_jpeg() {
        let mut stub = StubScene::new("scene").unwrap();
        let frame = stub.next_frame().unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        assert!(image::load_from_memory(&frame).is_ok());
    }

    #[test]
    fn default_pattern_is_scene() {
        let mut a = StubScene::new("").unwrap();
        let mut b = StubScene::new("scene").unwrap();
        assert_eq!(a.next_frame().unwrap(), b.next_frame().unwrap());
    }
}
