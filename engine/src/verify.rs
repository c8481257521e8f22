use biogate_vecstore::{cosine_distance, cosine_similarity};
use serde::{Deserialize, Serialize};

/// Verifier makes the pairwise same-person judgment for one modality.
///
/// It is independent of nearest-neighbor distance: the index only proposes
/// a candidate, the verifier decides whether it is the same person.
/// Implementations must be safe for concurrent use and must not touch any
/// index; they only see the two vectors.
pub trait Verifier: Send + Sync {
    /// Compare a freshly captured vector against a stored one.
    fn verify(&self, captured: &[f32], stored: &[f32]) -> bool;
}

impl<F> Verifier for F
where
    F: Fn(&[f32], &[f32]) -> bool + Send + Sync,
{
    fn verify(&self, captured: &[f32], stored: &[f32]) -> bool {
        self(captured, stored)
    }
}

/// Acceptance rule of a [`CosineVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Accept when cosine distance is at most this value.
    MaxDistance(f32),
    /// Accept when cosine similarity is strictly above this value.
    MinSimilarity(f32),
}

/// Cosine-based verifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosineVerifier {
    pub threshold: Threshold,
}

impl CosineVerifier {
    pub fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    /// Face embeddings: same person when cosine distance <= 0.25.
    pub fn face_default() -> Self {
        Self::new(Threshold::MaxDistance(0.25))
    }

    /// Speaker embeddings: same person when cosine similarity > 0.25.
    pub fn voice_default() -> Self {
        Self::new(Threshold::MinSimilarity(0.25))
    }
}

impl Verifier for CosineVerifier {
    fn verify(&self, captured: &[f32], stored: &[f32]) -> bool {
        if captured.len() != stored.len() {
            return false;
        }
        match self.threshold {
            Threshold::MaxDistance(max) => cosine_distance(captured, stored) <= max,
            Threshold::MinSimilarity(min) => cosine_similarity(captured, stored) > min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_default_accepts_close_vectors() {
        let v = CosineVerifier::face_default();
        assert!(v.verify(&[1.0, 0.0, 0.0], &[0.95, 0.1, 0.0]));
        assert!(!v.verify(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]));
    }

    #[test]
    fn voice_default_uses_similarity() {
        let v = CosineVerifier::voice_default();
        // cos = 0.6
        assert!(v.verify(&[1.0, 0.0], &[0.6, 0.8]));
        // cos = 0.0
        assert!(!v.verify(&[1.0, 0.0], &[0.0, 1.0]));
    }

    #[test]
    fn mismatched_lengths_never_verify() {
        let v = CosineVerifier::new(Threshold::MaxDistance(2.0));
        assert!(!v.verify(&[1.0, 0.0], &[1.0, 0.0, 0.0]));
    }

    #[test]
    fn closures_are_verifiers() {
        let always = |_: &[f32], _: &[f32]| true;
        assert!(always.verify(&[1.0], &[2.0]));
    }

    #[test]
    fn threshold_from_yaml_like_json() {
        let v: CosineVerifier =
            serde_json::from_str(r#"{"threshold": {"max_distance": 0.3}}"#).unwrap();
        assert_eq!(v.threshold, Threshold::MaxDistance(0.3));
    }
}
