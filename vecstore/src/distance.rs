use serde::{Deserialize, Serialize};

/// Distance metric used both to build a snapshot and to rank query results.
///
/// A snapshot records the metric it was built with; queries always use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `sqrt(2 - 2 cos)`, the Euclidean distance between unit-normalized
    /// vectors. Range `[0, 2]`.
    #[default]
    Angular,
    /// `1 - cos`. Range `[0, 2]`.
    Cosine,
    /// Plain L2 distance.
    Euclidean,
}

impl Metric {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Metric::Angular => 0,
            Metric::Cosine => 1,
            Metric::Euclidean => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Metric::Angular),
            1 => Some(Metric::Cosine),
            2 => Some(Metric::Euclidean),
            _ => None,
        }
    }

    /// Whether split hyperplanes are computed on unit-normalized vectors.
    pub(crate) fn is_directional(self) -> bool {
        !matches!(self, Metric::Euclidean)
    }

    /// Distance between two vectors under this metric.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Angular => {
                let cos = 1.0 - cosine_distance(a, b) as f64;
                (2.0 - 2.0 * cos).max(0.0).sqrt() as f32
            }
            Metric::Cosine => cosine_distance(a, b),
            Metric::Euclidean => euclidean_distance(a, b),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Angular => write!(f, "angular"),
            Metric::Cosine => write!(f, "cosine"),
            Metric::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// Compute the cosine distance between two vectors.
///
/// Returns a value in `[0, 2]` where 0 means identical direction and
/// 2 means opposite direction. Uses f64 intermediate precision.
/// Returns 2.0 for zero vectors or dimension mismatches.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = x as f64;
        let y = y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

/// Cosine similarity in `[-1, 1]`; 0 for zero vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let d = cosine_distance(a, b);
    if d == 2.0 && (is_zero(a) || is_zero(b)) {
        return 0.0;
    }
    1.0 - d
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Returns a unit-length copy of `v`; zero vectors are returned unchanged.
pub(crate) fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|&x| (x as f64 / norm) as f32).collect()
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(d.abs() < 0.001, "identical: got {d}");
        assert!(Metric::Angular.distance(&[1.0, 0.0], &[2.0, 0.0]) < 0.001);
    }

    #[test]
    fn test_orthogonal() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 1.0).abs() < 0.001, "orthogonal: got {d}");
        let a = Metric::Angular.distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((a - std::f32::consts::SQRT_2).abs() < 0.001, "angular: got {a}");
    }

    #[test]
    fn test_opposite() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((d - 2.0).abs() < 0.001, "opposite: got {d}");
        let a = Metric::Angular.distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((a - 2.0).abs() < 0.001, "angular opposite: got {a}");
    }

    #[test]
    fn test_dimension_mismatch() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean() {
        let d = Metric::Euclidean.distance(&[0.0, 3.0], &[4.0, 0.0]);
        assert!((d - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_metric_tag_roundtrip_and_display() {
        for m in [Metric::Angular, Metric::Cosine, Metric::Euclidean] {
            assert_eq!(Metric::from_tag(m.tag()), Some(m));
        }
        assert_eq!(Metric::from_tag(9), None);
        assert_eq!(Metric::Angular.to_string(), "angular");
    }

    #[test]
    fn test_normalized() {
        let v = normalized(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalized(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
