//! Image → embedding pipeline.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face could not be detected in the image")]
    NoFaceDetected,
}

/// Anything that turns a face image into a fixed-length embedding.
pub trait FaceEmbedder {
    fn represent(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedError>;
}

impl<E: FaceEmbedder + ?Sized> FaceEmbedder for Box<E> {
    fn represent(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedError> {
        (**self).represent(image)
    }
}

/// SCRFD detection followed by ArcFace recognition of the most confident face.
pub struct OnnxEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both ONNX models. Fails fast if either file is missing.
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, EmbedError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn represent(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedError> {
        let rgb = image.to_rgb8();
        let faces = self.detector.detect(&rgb)?;
        let face = faces.first().ok_or(EmbedError::NoFaceDetected)?;

        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            width = rgb.width(),
            height = rgb.height(),
            "embedding most confident face"
        );

        Ok(self.recognizer.extract(&rgb, face)?)
    }
}
