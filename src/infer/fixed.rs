//! Constant-probability classifier.

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::Classifier;

/// Answers the same probability for every frame. `fixed:0.0` silences the
/// pipeline, `fixed:1.0` fires on every usable frame; both are useful for
/// drills and tests.
pub struct FixedClassifier {
    probability: f32,
}

impl FixedClassifier {
    /// `spec` is the part after `fixed:`.
    pub fn new(spec: &str) -> Result<Self> {
        let probability: f32 = spec
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid fixed probability '{spec}'"))?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(anyhow!(
                "fixed probability {probability} must be within [0, 1]"
            ));
        }
        Ok(Self { probability })
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn predict(&mut self, _image: &RgbImage) -> Result<f32> {
        Ok(self.probability)
    }
}
