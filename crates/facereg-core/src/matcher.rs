//! Linear nearest-neighbour matching over enrolled identities.

use crate::distance::DistanceMetric;
use crate::types::{Embedding, IdentityRecord};

/// Closest gallery record that fell under the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub name: String,
    pub distance: f32,
    /// Position of the record in the gallery (file order).
    pub index: usize,
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[IdentityRecord],
        threshold: f32,
    ) -> Option<Match>;
}

/// Exhaustive scan with a single distance metric.
///
/// A record is only a candidate if its distance is strictly below both the
/// threshold and the best distance seen so far, so ties go to the record
/// that appears first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearMatcher {
    pub metric: DistanceMetric,
}

impl LinearMatcher {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl Matcher for LinearMatcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[IdentityRecord],
        threshold: f32,
    ) -> Option<Match> {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            if record.embedding.len() != probe.len() {
                tracing::warn!(
                    name = %record.name,
                    stored = record.embedding.len(),
                    probe = probe.len(),
                    "skipping record with mismatched embedding dimension"
                );
                continue;
            }

            let dist = self.metric.distance(probe, &record.embedding);
            if dist < best_dist && dist < threshold {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        best_idx.map(|index| Match {
            name: gallery[index].name.clone(),
            distance: best_dist,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: &[f32]) -> IdentityRecord {
        IdentityRecord::new(name, Embedding::new(values.to_vec()))
    }

    #[test]
    fn test_best_match_scans_whole_gallery() {
        // Best match is the last entry.
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            record("decoy1", &[0.0, 1.0, 0.0]),
            record("decoy2", &[0.0, 0.0, 1.0]),
            record("match", &[1.0, 0.0, 0.0]),
        ];

        let m = LinearMatcher::default().best_match(&probe, &gallery, 0.4).unwrap();
        assert_eq!(m.name, "match");
        assert_eq!(m.index, 2);
        assert!(m.distance.abs() < 1e-6);
    }

    #[test]
    fn test_best_match_none_above_threshold() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![record("other", &[0.0, 1.0, 0.0])];
        assert!(LinearMatcher::default().best_match(&probe, &gallery, 0.4).is_none());
    }

    #[test]
    fn test_best_match_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        assert!(LinearMatcher::default().best_match(&probe, &[], 0.4).is_none());
    }

    #[test]
    fn test_best_match_tie_goes_to_first() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            record("first", &[2.0, 0.0]),
            record("second", &[3.0, 0.0]),
        ];
        let m = LinearMatcher::new(DistanceMetric::Cosine)
            .best_match(&probe, &gallery, 0.4)
            .unwrap();
        assert_eq!(m.name, "first");
        assert_eq!(m.index, 0);
    }

    #[test]
    fn test_distance_equal_to_threshold_does_not_match() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![record("edge", &[3.0, 4.0])];
        let matcher = LinearMatcher::new(DistanceMetric::Euclidean);
        assert!(matcher.best_match(&probe, &gallery, 5.0).is_none());
        assert!(matcher.best_match(&probe, &gallery, 5.001).is_some());
    }

    #[test]
    fn test_picks_minimum_distance() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            record("far", &[3.0, 0.0]),
            record("near", &[1.0, 0.0]),
            record("mid", &[2.0, 0.0]),
        ];
        let m = LinearMatcher::new(DistanceMetric::Euclidean)
            .best_match(&probe, &gallery, 10.0)
            .unwrap();
        assert_eq!(m.name, "near");
        assert!((m.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_skips_mismatched_dimension() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            record("short", &[1.0]),
            record("ok", &[1.0, 0.0]),
        ];
        let m = LinearMatcher::default().best_match(&probe, &gallery, 0.4).unwrap();
        assert_eq!(m.name, "ok");
    }
}
