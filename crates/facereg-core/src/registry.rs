//! Enroll / recognize / delete / list on top of an embedder and a store.

use crate::distance::{DistanceMetric, ModelFamily};
use crate::embedder::{EmbedError, FaceEmbedder};
use crate::matcher::{LinearMatcher, Match, Matcher};
use crate::store::{IdentityStore, StoreError, RECORD_DELIMITER};
use crate::types::{Embedding, IdentityRecord};
use image::DynamicImage;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("invalid person name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid threshold {0}: must be a finite, non-negative number")]
    InvalidThreshold(f32),
}

/// Result of an enrollment.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    /// A new record was appended.
    Added,
    /// The face already matched an enrolled identity; nothing was written.
    Duplicate { existing: String },
}

/// Snapshot of the registry for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub model: ModelFamily,
    pub store_path: PathBuf,
    pub store_exists: bool,
    pub records: usize,
}

pub struct FaceRegistry<E> {
    embedder: E,
    store: IdentityStore,
    model: ModelFamily,
}

impl<E: FaceEmbedder> FaceRegistry<E> {
    pub fn new(embedder: E, store: IdentityStore, model: ModelFamily) -> Self {
        Self { embedder, store, model }
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn model(&self) -> ModelFamily {
        self.model
    }

    /// Enroll `name` with the face in `image`, unless that face is already known.
    ///
    /// The duplicate check only runs when the store exists; the first
    /// enrollment creates it.
    pub fn enroll(
        &mut self,
        name: &str,
        image: &DynamicImage,
    ) -> Result<EnrollOutcome, RegistryError> {
        validate_name(name)?;
        let embedding = self.embedder.represent(image)?;

        if self.store.exists() {
            let existing = self.match_embedding(&embedding, DistanceMetric::default(), None)?;
            if let Some(existing) = existing {
                tracing::info!(
                    name,
                    existing = %existing.name,
                    distance = existing.distance,
                    "enrollment skipped: face already enrolled"
                );
                return Ok(EnrollOutcome::Duplicate { existing: existing.name });
            }
        }

        self.store.append(&IdentityRecord::new(name, embedding))?;
        tracing::info!(name, path = %self.store.path().display(), "person enrolled");
        Ok(EnrollOutcome::Added)
    }

    /// Name of the closest enrolled face under the threshold, if any.
    ///
    /// `threshold` defaults to the model family's calibrated value for `metric`.
    pub fn recognize(
        &mut self,
        image: &DynamicImage,
        metric: DistanceMetric,
        threshold: Option<f32>,
    ) -> Result<Option<Match>, RegistryError> {
        check_threshold(threshold)?;
        // Fail on a missing store before paying for inference.
        if !self.store.exists() {
            return Err(StoreError::NotFound(self.store.path().to_path_buf()).into());
        }
        let embedding = self.embedder.represent(image)?;
        self.match_embedding(&embedding, metric, threshold)
    }

    /// Match an already computed embedding against every stored record.
    pub fn match_embedding(
        &self,
        embedding: &Embedding,
        metric: DistanceMetric,
        threshold: Option<f32>,
    ) -> Result<Option<Match>, RegistryError> {
        check_threshold(threshold)?;
        let threshold = threshold.unwrap_or_else(|| self.model.threshold(metric));
        let gallery = self.store.load()?;
        let result = LinearMatcher::new(metric).best_match(embedding, &gallery, threshold);

        tracing::debug!(
            %metric,
            threshold,
            records = gallery.len(),
            matched = result.as_ref().map(|m| m.name.as_str()),
            "linear match complete"
        );
        Ok(result)
    }

    /// Remove every record named exactly `name`. Returns whether any existed.
    pub fn delete(&self, name: &str) -> Result<bool, RegistryError> {
        let removed = self.store.remove(name)?;
        if removed {
            tracing::info!(name, "person deleted");
        } else {
            tracing::info!(name, "delete requested for unknown person");
        }
        Ok(removed)
    }

    /// All enrolled names in file order.
    pub fn list_all(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.names()?)
    }

    pub fn status(&self) -> Result<RegistryStatus, RegistryError> {
        let store_exists = self.store.exists();
        let records = if store_exists { self.store.names()?.len() } else { 0 };
        Ok(RegistryStatus {
            model: self.model,
            store_path: self.store.path().to_path_buf(),
            store_exists,
            records,
        })
    }
}

/// A name must survive the one-record-per-line `name: [...]` format.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.contains(RECORD_DELIMITER) {
        Some("name contains the record delimiter \": \"")
    } else if name.contains(['\n', '\r']) {
        Some("name contains a line break")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_threshold(threshold: Option<f32>) -> Result<(), RegistryError> {
    match threshold {
        Some(t) if !t.is_finite() || t < 0.0 => Err(RegistryError::InvalidThreshold(t)),
        _ => Ok(()),
    }
}
