//! Fire classification and the detection path.
//!
//! A `Classifier` turns decoded frames into a fire probability. Two
//! backends exist: `fixed:<p>` answers a constant (development, tests,
//! drills), and `backend-tract` builds ONNX inference in. The
//! `DetectionHandler` wraps a classifier with the quality screen, the
//! dedup window, photo storage, and alert publication.

mod consumer;
mod dedup;
mod fixed;
#[cfg(feature = "backend-tract")]
mod tract;

pub use consumer::{
    AlertDestination, AlertSink, Detection, DetectionHandler, DetectionStats, InMemoryAlertSink,
    Label,
};
pub use dedup::{content_hash, DedupWindow, QUIET_PERIOD_S};
pub use fixed::FixedClassifier;
#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::config::PipelineConfig;

/// Probability at or above which a frame counts as fire.
pub const FIRE_PROBABILITY_THRESHOLD: f32 = 0.5;

/// A fire classifier over decoded RGB frames.
pub trait Classifier {
    fn name(&self) -> &'static str;

    /// Probability of fire in `[0, 1]`.
    fn predict(&mut self, image: &RgbImage) -> Result<f32>;

    /// Run once at startup so the first real frame does not pay
    /// first-inference cost.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("name", &self.name())
            .finish()
    }
}

/// Build the classifier named by `model` in the configuration:
/// `fixed:<probability>` or a path to an `.onnx` file.
pub fn open_classifier(config: &PipelineConfig) -> Result<Box<dyn Classifier>> {
    let spec = config.model.trim();
    if let Some(probability) = spec.strip_prefix("fixed:") {
        return Ok(Box::new(FixedClassifier::new(probability)?));
    }
    if spec.ends_with(".onnx") {
        #[cfg(feature = "backend-tract")]
        {
            let classifier = tract::TractClassifier::load(
                std::path::Path::new(spec),
                config.model_input_size,
            )?;
            return Ok(Box::new(classifier));
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            return Err(anyhow!(
                "model '{spec}' requires a build with --features backend-tract"
            ));
        }
    }
    Err(anyhow!(
        "unrecognized model '{spec}': expected 'fixed:<probability>' or an .onnx path"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_model_spec_builds() {
        let mut config = PipelineConfig::default();
        config.model = "fixed:0.75".to_string();
        let classifier = open_classifier(&config).unwrap();
        assert_eq!(classifier.name(), "fixed");
    }

    #[test]
    fn unrecognized_model_spec_is_rejected() {
        let mut config = PipelineConfig::default();
        config.model = "magic".to_string();
        assert!(open_classifier(&config).is_err());
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn onnx_spec_names_the_missing_feature() {
        let mut config = PipelineConfig::default();
        config.model = "fire.onnx".to_string();
        let err = open_classifier(&config).unwrap_err();
        assert!(format!("{err}").contains("backend-tract"));
    }
}
