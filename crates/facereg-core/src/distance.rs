//! Distance metrics and per-model decision thresholds.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid distance metric: {0:?} (expected cosine, euclidean or euclidean_l2)")]
pub struct InvalidMetric(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown model family: {0:?}")]
pub struct UnknownModel(pub String);

/// How dissimilarity between two embeddings is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    /// Euclidean distance between the L2-normalized vectors.
    EuclideanL2,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 3] = [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::EuclideanL2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }

    /// Distance between `a` and `b` under this metric. Lower = more similar.
    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            DistanceMetric::Cosine => a.cosine_distance(b),
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = InvalidMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| InvalidMetric(s.to_string()))
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognition model whose calibrated thresholds apply to stored embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "VGG-Face")]
    VggFace,
    Facenet,
    Facenet512,
    #[default]
    ArcFace,
    Dlib,
    SFace,
    OpenFace,
    DeepFace,
    DeepID,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 9] = [
        ModelFamily::VggFace,
        ModelFamily::Facenet,
        ModelFamily::Facenet512,
        ModelFamily::ArcFace,
        ModelFamily::Dlib,
        ModelFamily::SFace,
        ModelFamily::OpenFace,
        ModelFamily::DeepFace,
        ModelFamily::DeepID,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::VggFace => "VGG-Face",
            ModelFamily::Facenet => "Facenet",
            ModelFamily::Facenet512 => "Facenet512",
            ModelFamily::ArcFace => "ArcFace",
            ModelFamily::Dlib => "Dlib",
            ModelFamily::SFace => "SFace",
            ModelFamily::OpenFace => "OpenFace",
            ModelFamily::DeepFace => "DeepFace",
            ModelFamily::DeepID => "DeepID",
        }
    }

    /// Largest distance still considered the same person, for `metric`.
    pub fn threshold(&self, metric: DistanceMetric) -> f32 {
        // (cosine, euclidean, euclidean_l2)
        let (cosine, euclidean, euclidean_l2) = match self {
            ModelFamily::VggFace => (0.40, 0.60, 0.86),
            ModelFamily::Facenet => (0.40, 10.0, 0.80),
            ModelFamily::Facenet512 => (0.30, 23.56, 1.04),
            ModelFamily::ArcFace => (0.68, 4.15, 1.13),
            ModelFamily::Dlib => (0.07, 0.60, 0.40),
            ModelFamily::SFace => (0.593, 10.734, 1.055),
            ModelFamily::OpenFace => (0.10, 0.55, 0.55),
            ModelFamily::DeepFace => (0.23, 64.0, 0.64),
            ModelFamily::DeepID => (0.015, 45.0, 0.17),
        };
        match metric {
            DistanceMetric::Cosine => cosine,
            DistanceMetric::Euclidean => euclidean,
            DistanceMetric::EuclideanL2 => euclidean_l2,
        }
    }
}

impl FromStr for ModelFamily {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
