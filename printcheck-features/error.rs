use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Invalid max feature count: {0} (must be > 0)")]
    InvalidMaxFeatures(usize),
    #[error("Invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),
    #[error("Invalid patch size: {0} (must be odd and within 7-63)")]
    InvalidPatchSize(usize),
    #[error("Invalid pyramid: {levels} levels with scale factor {scale_factor}")]
    InvalidPyramid { levels: usize, scale_factor: f32 },
}

pub type FeatureResult<T> = Result<T, FeatureError>;
