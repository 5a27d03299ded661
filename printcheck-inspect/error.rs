use std::path::PathBuf;

use printcheck_core::ConfigError;
use printcheck_features::FeatureError;
use thiserror::Error;

use crate::homography::HomographyError;

/// Why the test image could not be brought into the golden frame
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("not enough keypoints: reference has {reference}, moving has {moving}, need {needed}")]
    InsufficientKeypoints {
        reference: usize,
        moving: usize,
        needed: usize,
    },
    #[error("not enough good matches: found {found}, need {needed}")]
    InsufficientMatches { found: usize, needed: usize },
    #[error("homography estimation failed")]
    Homography(#[from] HomographyError),
    #[error("invalid feature detector parameters")]
    Features(#[from] FeatureError),
}

/// Problems with the images handed to the pipeline
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} image is empty")]
    EmptyImage(&'static str),
    #[error("image sizes differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("failed to load image {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image path does not exist: {}", .0.display())]
    MissingPath(PathBuf),
}

/// Any failure of an inspection run
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("alignment failed")]
    Alignment(#[from] AlignmentError),
    #[error("invalid input")]
    Input(#[from] InputError),
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

pub type InspectResult<T> = Result<T, InspectError>;
