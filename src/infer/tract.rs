//! ONNX inference through tract.
//!
//! The model is expected to take one NHWC float tensor of RGB values
//! scaled to `[0, 1]` and produce the fire probability as the first value
//! of its first output. Frames are resized to the model's input square
//! before inference.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;
use tract_onnx::prelude::*;

use super::Classifier;

pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_size: u32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load(model_path: &Path, input_size: u32) -> Result<Self> {
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, 3)),
            )
            .context("failed to set model input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX model {} (input {}x{})",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized;
        let pixels = if image.dimensions() == (self.input_size, self.input_size) {
            image
        } else {
            resized = image::imageops::resize(
                image,
                self.input_size,
                self.input_size,
                image::imageops::FilterType::Triangle,
            );
            &resized
        };
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
            pixels.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(&mut self, image: &RgbImage) -> Result<f32> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let probability = scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output was empty"))?;
        Ok(probability.clamp(0.0, 1.0))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::from_pixel(self.input_size, self.input_size, image::Rgb([0, 0, 0]));
        self.predict(&blank)
            .map(|_| ())
            .context("model warm-up inference failed")
    }
}
