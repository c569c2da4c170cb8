//! Nearest-identity classification of face descriptors.

use crate::roster::Identity;
use crate::types::FaceDescriptor;

/// Default maximum Euclidean distance for two descriptors to be the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Distances closer than this are treated as a tie.
const TIE_EPSILON: f32 = 1e-6;

/// Outcome of classifying one descriptor against a roster.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Matches an identity already counted in this session.
    Known { label: String, distance: f32 },
    /// Not seen before. `nearest_distance` is `None` for an empty roster.
    New { nearest_distance: Option<f32> },
}

impl Classification {
    pub fn is_new(&self) -> bool {
        matches!(self, Classification::New { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Classification::Known { label, .. } => Some(label),
            Classification::New { .. } => None,
        }
    }
}

/// Strategy for comparing a probe descriptor against the identities of a roster.
pub trait Matcher {
    fn classify(&self, probe: &FaceDescriptor, gallery: &[Identity]) -> Classification;
}

/// Euclidean nearest-neighbour matcher with an inclusive distance threshold.
///
/// Ties at the minimum distance resolve to the identity registered first.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn classify(&self, probe: &FaceDescriptor, gallery: &[Identity]) -> Classification {
        if gallery.is_empty() {
            return Classification::New {
                nearest_distance: None,
            };
        }

        let distances: Vec<f32> = gallery
            .iter()
            .map(|identity| probe.euclidean_distance(&identity.reference))
            .collect();
        let nearest = distances.iter().copied().fold(f32::INFINITY, f32::min);

        if nearest > self.threshold {
            return Classification::New {
                nearest_distance: Some(nearest),
            };
        }

        // earliest identity within epsilon of the minimum wins the tie
        let idx = distances
            .iter()
            .position(|&distance| distance <= nearest + TIE_EPSILON)
            .unwrap_or(0);
        Classification::Known {
            label: gallery[idx].label.clone(),
            distance: nearest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;

    fn d(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec())
    }

    #[test]
    fn test_empty_roster_is_new() {
        let result = EuclideanMatcher::default().classify(&d(&[0.1, 0.2]), &[]);
        assert_eq!(result, Classification::New { nearest_distance: None });
    }

    #[test]
    fn test_exact_reference_is_known() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0, 0.0]));
        roster.register(d(&[1.0, 1.0]));
        roster.register(d(&[2.0, 2.0]));

        let matcher = EuclideanMatcher::default();
        for identity in roster.identities() {
            let result = matcher.classify(&identity.reference, roster.identities());
            assert_eq!(result.label(), Some(identity.label.as_str()));
        }
    }

    #[test]
    fn test_nearest_identity_wins() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0, 0.0]));
        roster.register(d(&[0.5, 0.0]));

        let result = EuclideanMatcher::default().classify(&d(&[0.4, 0.0]), roster.identities());
        assert_eq!(result.label(), Some("Student 2"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0]));

        let matcher = EuclideanMatcher::new(0.5);
        let at = matcher.classify(&d(&[0.5]), roster.identities());
        assert_eq!(
            at,
            Classification::Known {
                label: "Student 1".into(),
                distance: 0.5
            }
        );

        let beyond = matcher.classify(&d(&[0.5001]), roster.identities());
        assert!(beyond.is_new());
    }

    #[test]
    fn test_tie_prefers_earliest_identity() {
        let mut roster = Roster::new();
        roster.register(d(&[-0.2, 0.0]));
        roster.register(d(&[0.2, 0.0]));

        // equidistant from both references
        let result = EuclideanMatcher::default().classify(&d(&[0.0, 0.0]), roster.identities());
        assert_eq!(result.label(), Some("Student 1"));
    }

    #[test]
    fn test_near_tie_compares_minimum_against_threshold() {
        let mut roster = Roster::new();
        roster.register(d(&[0.5000008]));
        roster.register(d(&[0.4999999]));

        // the second reference is nearest and within threshold; the first is tied within epsilon
        let result = EuclideanMatcher::new(0.5).classify(&d(&[0.0]), roster.identities());
        match result {
            Classification::Known { label, distance } => {
                assert_eq!(label, "Student 1");
                assert!(distance <= 0.5);
            }
            other => panic!("expected known, got {other:?}"),
        }
    }

    #[test]
    fn test_new_reports_nearest_distance() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0, 0.0]));

        let result = EuclideanMatcher::default().classify(&d(&[0.0, 0.7]), roster.identities());
        match result {
            Classification::New {
                nearest_distance: Some(dist),
            } => assert!((dist - 0.7).abs() < 1e-6),
            other => panic!("expected new, got {other:?}"),
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0, 0.3]));
        roster.register(d(&[0.9, 0.1]));

        let matcher = EuclideanMatcher::default();
        let probe = d(&[0.2, 0.3]);
        let first = matcher.classify(&probe, roster.identities());
        let second = matcher.classify(&probe, roster.identities());
        assert_eq!(first, second);
    }

    #[test]
    fn test_mismatched_length_never_matches() {
        let mut roster = Roster::new();
        roster.register(d(&[0.0, 0.0]));

        let result = EuclideanMatcher::default().classify(&d(&[0.0, 0.0, 0.0]), roster.identities());
        assert!(result.is_new());
    }
}
