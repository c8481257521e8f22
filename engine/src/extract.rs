use std::path::Path;

/// FeatureExtractor turns captured media (an image or an audio clip) into a
/// feature vector for one modality.
///
/// Returns `None` when no usable vector can be produced (no face found,
/// audio too short, model failure). Implementations log the cause.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, media: &Path) -> Option<Vec<f32>>;
}

impl<F> FeatureExtractor for F
where
    F: Fn(&Path) -> Option<Vec<f32>> + Send + Sync,
{
    fn extract(&self, media: &Path) -> Option<Vec<f32>> {
        self(media)
    }
}
