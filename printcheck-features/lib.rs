//! Oriented FAST keypoints, rotated BRIEF descriptors and Hamming matching.
//!
//! ```no_run
//! use printcheck_features::{BruteForceMatcher, OrbDetector, OrbParams};
//!
//! let detector = OrbDetector::new(OrbParams::default()).unwrap();
//! let a = detector.detect_and_describe(&image::GrayImage::new(640, 480));
//! let b = detector.detect_and_describe(&image::GrayImage::new(640, 480));
//! let knn = BruteForceMatcher::knn_match(&a.descriptors, &b.descriptors, 2);
//! let good = BruteForceMatcher::ratio_test(&knn, 0.75);
//! ```

pub mod corner_detection;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod matcher;
pub mod orientation;
pub mod pyramid;
pub mod types;
pub mod utils;

pub use detector::{OrbDetector, OrbParams, DEFAULT_PATCH_SIZE};
pub use error::{FeatureError, FeatureResult};
pub use matcher::{hamming_distance, BruteForceMatcher};
pub use types::{Features, ScaleLevel};
