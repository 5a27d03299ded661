//! Shared types and configuration for garment print inspection.

pub mod config;
pub mod error;

pub use config::{DetectionConfig, DetectionConfigBuilder};
pub use error::{ConfigError, ConfigResult};

/// Row-major 8-bit grayscale image
pub type GrayImage = image::GrayImage;

/// Per-pixel perceptual color distance, one value per golden-image pixel
pub type DistanceMap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Binary defect mask: 255 marks a defect pixel, 0 background
pub type DefectMask = image::GrayImage;

/// Foreground value used in every defect mask
pub const MASK_ON: u8 = 255;

/// Key-point ≙ FAST corner + orientation (radians), in level-0 pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    /// Harris corner response used for ranking
    pub response: f32,
    /// Pyramid level the corner was detected on
    pub octave: u8,
}

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; 32];

/// Pairing of a query descriptor with a train descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    /// Index into the query (moving image) keypoints
    pub query_idx: usize,
    /// Index into the train (reference image) keypoints
    pub train_idx: usize,
    /// Hamming distance between the two descriptors
    pub distance: u32,
}
