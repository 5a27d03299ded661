use printcheck_core::{DetectionConfig, GrayImage, Keypoint};
use rayon::prelude::*;

use crate::corner_detection::{Corner, CornerDetector};
use crate::descriptor::BriefGenerator;
use crate::error::{FeatureError, FeatureResult};
use crate::orientation::OrientationEstimator;
use crate::pyramid::ImagePyramid;
use crate::types::{Features, ScaleLevel};

/// Side of the square patch used for orientation and descriptors
pub const DEFAULT_PATCH_SIZE: usize = 31;

/// Parameters of the oriented FAST / rotated BRIEF detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbParams {
    pub max_features: usize,
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    pub patch_size: usize,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 500,
            fast_threshold: 20,
            pyramid_levels: 8,
            scale_factor: 1.2,
            patch_size: DEFAULT_PATCH_SIZE,
        }
    }
}

impl From<&DetectionConfig> for OrbParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            max_features: config.orb_max_features,
            fast_threshold: config.fast_threshold,
            pyramid_levels: config.pyramid_levels,
            scale_factor: config.pyramid_scale_factor,
            patch_size: DEFAULT_PATCH_SIZE,
        }
    }
}

impl OrbParams {
    pub fn validate(&self) -> FeatureResult<()> {
        if self.max_features == 0 {
            return Err(FeatureError::InvalidMaxFeatures(self.max_features));
        }
        // 0 would accept every pixel, >127 breaks the saturating comparisons
        if self.fast_threshold == 0 || self.fast_threshold > 127 {
            return Err(FeatureError::InvalidThreshold(self.fast_threshold));
        }
        if self.patch_size % 2 == 0 || !(7..=63).contains(&self.patch_size) {
            return Err(FeatureError::InvalidPatchSize(self.patch_size));
        }
        let scale_ok = self.scale_factor.is_finite() && self.scale_factor > 1.0;
        if self.pyramid_levels == 0 || self.pyramid_levels > 16 || !scale_ok {
            return Err(FeatureError::InvalidPyramid {
                levels: self.pyramid_levels,
                scale_factor: self.scale_factor,
            });
        }
        Ok(())
    }

    /// Pixels kept clear of every level edge so patches stay inside the image
    pub fn border(&self) -> u32 {
        (self.patch_size / 2 + 4) as u32
    }
}

/// Multi-scale oriented FAST detector with rotated BRIEF descriptors
#[derive(Debug, Clone)]
pub struct OrbDetector {
    params: OrbParams,
    orientation: OrientationEstimator,
    brief: BriefGenerator,
}

impl OrbDetector {
    /// Creates a new detector with validation
    pub fn new(params: OrbParams) -> FeatureResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            orientation: OrientationEstimator::new(params.patch_size),
            brief: BriefGenerator::new(params.patch_size),
        })
    }

    pub fn params(&self) -> &OrbParams {
        &self.params
    }

    /// Detect keypoints only (level-0 coordinates)
    pub fn detect_keypoints(&self, img: &GrayImage) -> Vec<Keypoint> {
        self.detect_and_describe(img).keypoints
    }

    /// Detect up to `max_features` oriented keypoints and describe them.
    ///
    /// Images too small to hold a single detection window yield no features.
    pub fn detect_and_describe(&self, img: &GrayImage) -> Features {
        let (w, h) = img.dimensions();
        let levels = ImagePyramid::generate_scale_levels(
            w,
            h,
            self.params.pyramid_levels,
            self.params.scale_factor,
            self.params.border(),
        );
        if levels.is_empty() {
            return Features::default();
        }

        let pyramid = ImagePyramid::build_image_pyramid(img, &levels);
        let budgets =
            ImagePyramid::features_per_level(self.params.max_features, levels.len(), self.params.scale_factor);

        let per_level: Vec<Features> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(budgets.par_iter())
            .map(|((level, level_img), &budget)| self.detect_at_level(level_img, level, budget))
            .collect();

        let mut features = Features::default();
        for level in per_level {
            features.keypoints.extend(level.keypoints);
            features.descriptors.extend(level.descriptors);
        }
        features
    }

    fn detect_at_level(&self, img: &GrayImage, level: &ScaleLevel, budget: usize) -> Features {
        if budget == 0 {
            return Features::default();
        }

        let mut corners = CornerDetector::detect(img, self.params.fast_threshold, self.params.border());
        retain_strongest(&mut corners, budget);
        if corners.is_empty() {
            return Features::default();
        }

        let oriented: Vec<(f32, f32, f32)> = corners
            .iter()
            .map(|c| (c.x as f32, c.y as f32, self.orientation.compute(img, c.x, c.y)))
            .collect();

        let smoothed = self.brief.prepare(img);
        let descriptors = self.brief.generate_descriptors(&smoothed, &oriented);

        let keypoints = corners
            .iter()
            .zip(&oriented)
            .map(|(c, &(x, y, angle))| Keypoint {
                x: x * level.scale,
                y: y * level.scale,
                angle,
                response: c.response,
                octave: level.level as u8,
            })
            .collect();

        Features { keypoints, descriptors }
    }
}

/// Keep the `n` highest-response corners; equal responses keep raster order
fn retain_strongest(corners: &mut Vec<Corner>, n: usize) {
    corners.sort_by(|a, b| b.response.total_cmp(&a.response));
    corners.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blocks(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells: Vec<u8> = (0..(width / 8 + 1) * (height / 8 + 1)).map(|_| rng.random()).collect();
        let stride = width / 8 + 1;
        GrayImage::from_fn(width, height, |x, y| Luma([cells[((y / 8) * stride + x / 8) as usize]]))
    }

    #[test]
    fn test_params_validation() {
        assert!(OrbParams::default().validate().is_ok());

        let bad = OrbParams { max_features: 0, ..OrbParams::default() };
        assert_eq!(bad.validate(), Err(FeatureError::InvalidMaxFeatures(0)));

        let bad = OrbParams { fast_threshold: 200, ..OrbParams::default() };
        assert_eq!(bad.validate(), Err(FeatureError::InvalidThreshold(200)));

        let bad = OrbParams { patch_size: 30, ..OrbParams::default() };
        assert_eq!(bad.validate(), Err(FeatureError::InvalidPatchSize(30)));

        let bad = OrbParams { scale_factor: 1.0, ..OrbParams::default() };
        assert!(matches!(bad.validate(), Err(FeatureError::InvalidPyramid { .. })));
        assert!(OrbDetector::new(bad).is_err());
    }

    #[test]
    fn test_params_from_config() {
        let config = DetectionConfig::default();
        let params = OrbParams::from(&config);
        assert_eq!(params.max_features, config.orb_max_features);
        assert_eq!(params.pyramid_levels, config.pyramid_levels);
        assert_eq!(params.patch_size, DEFAULT_PATCH_SIZE);
        assert_eq!(params.border(), 19);
    }

    #[test]
    fn test_uniform_image_has_no_features() {
        let detector = OrbDetector::new(OrbParams::default()).unwrap();
        let img = GrayImage::from_pixel(160, 120, Luma([100]));
        assert!(detector.detect_and_describe(&img).is_empty());
    }

    #[test]
    fn test_tiny_image_has_no_features() {
        let detector = OrbDetector::new(OrbParams::default()).unwrap();
        assert!(detector.detect_and_describe(&blocks(20, 20, 1)).is_empty());
    }

    #[test]
    fn test_textured_image_features() {
        let params = OrbParams { max_features: 300, ..OrbParams::default() };
        let detector = OrbDetector::new(params).unwrap();
        let img = blocks(200, 160, 7);
        let features = detector.detect_and_describe(&img);

        assert!(features.len() >= 20);
        assert!(features.len() <= 300);
        assert_eq!(features.keypoints.len(), features.descriptors.len());
        for kp in &features.keypoints {
            assert!(kp.x >= 0.0 && kp.x < 200.0 && kp.y >= 0.0 && kp.y < 160.0);
            assert!(kp.angle.is_finite());
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = OrbDetector::new(OrbParams::default()).unwrap();
        let img = blocks(180, 180, 3);
        let a = detector.detect_and_describe(&img);
        let b = detector.detect_and_describe(&img);
        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
        assert_eq!(detector.detect_keypoints(&img), a.keypoints);
    }

    #[test]
    fn test_retain_strongest() {
        let mut corners = vec![
            Corner { x: 1, y: 1, response: 2.0 },
            Corner { x: 2, y: 1, response: 5.0 },
            Corner { x: 3, y: 1, response: 2.0 },
        ];
        retain_strongest(&mut corners, 2);
        assert_eq!(corners.iter().map(|c| c.x).collect::<Vec<_>>(), vec![2, 1]);
    }
}
