//! facereg-core — Face identity registry.
//!
//! A flat-file identity store, a linear nearest-neighbour matcher over the
//! stored embeddings, and an ONNX Runtime embedding pipeline (SCRFD face
//! detection followed by ArcFace recognition).

pub mod alignment;
pub mod detector;
pub mod distance;
pub mod embedder;
pub mod matcher;
pub mod recognizer;
pub mod registry;
pub mod store;
pub mod types;

pub use detector::FaceDetector;
pub use distance::{DistanceMetric, ModelFamily};
pub use embedder::{EmbedError, FaceEmbedder, OnnxEmbedder};
pub use matcher::{LinearMatcher, Match, Matcher};
pub use recognizer::FaceRecognizer;
pub use registry::{EnrollOutcome, FaceRegistry, RegistryError, RegistryStatus};
pub use store::{IdentityStore, StoreError};
pub use types::{BoundingBox, Embedding, IdentityRecord};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default directory holding the ONNX model files.
///
/// `$XDG_DATA_HOME/facereg/models`, falling back to `~/.local/share/facereg/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facereg")
        .join("models")
}

/// Default identity store location, relative to the working directory.
pub fn default_db_path() -> PathBuf {
    PathBuf::from("face_db.txt")
}
