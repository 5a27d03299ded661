//! Feature-based registration of a test image onto the golden frame.

use image::{imageops, RgbImage};
use nalgebra::Matrix3;
use printcheck_core::{DescriptorMatch, DetectionConfig};
use printcheck_features::{BruteForceMatcher, Features, OrbDetector, OrbParams, DEFAULT_PATCH_SIZE};
use tracing::{debug, info_span, warn};

use crate::error::AlignmentError;
use crate::homography::{find_homography, RansacParams, MIN_CORRESPONDENCES};
use crate::warp::warp_perspective;

/// Settings for [`Aligner`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignParams {
    pub max_features: usize,
    /// Fraction of mutual matches kept by the fallback
    pub keep_percent: f64,
    pub ratio: f64,
    /// Below this many ratio-test survivors the mutual-match fallback runs;
    /// it is also the fallback's minimum match count
    pub fallback_min_matches: usize,
    pub ransac: RansacParams,
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for AlignParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            max_features: config.orb_max_features,
            keep_percent: config.orb_keep_percent,
            ratio: config.ratio_test,
            fallback_min_matches: config.fallback_min_matches,
            ransac: RansacParams {
                max_iterations: config.ransac_max_iterations,
                reproj_threshold: config.ransac_reproj_threshold,
                seed: config.ransac_seed,
                ..RansacParams::default()
            },
            fast_threshold: config.fast_threshold,
            pyramid_levels: config.pyramid_levels,
            scale_factor: config.pyramid_scale_factor,
        }
    }
}

impl AlignParams {
    fn orb_params(&self) -> OrbParams {
        OrbParams {
            max_features: self.max_features,
            fast_threshold: self.fast_threshold,
            pyramid_levels: self.pyramid_levels,
            scale_factor: self.scale_factor,
            patch_size: DEFAULT_PATCH_SIZE,
        }
    }
}

/// Matching diagnostics of one alignment
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AlignmentReport {
    pub reference_keypoints: usize,
    pub moving_keypoints: usize,
    /// Matches surviving the ratio test
    pub ratio_matches: usize,
    /// Whether mutual nearest-neighbour matching replaced the ratio test
    pub used_fallback: bool,
    /// Correspondences handed to the homography estimator
    pub good_matches: usize,
    pub inliers: usize,
}

/// Moving image resampled into the reference frame
#[derive(Debug, Clone)]
pub struct Alignment {
    pub aligned: RgbImage,
    /// Maps moving-image coordinates to reference-image coordinates
    pub homography: Matrix3<f64>,
    pub report: AlignmentReport,
}

/// Registers images with oriented FAST/BRIEF features and a RANSAC homography
#[derive(Debug, Clone)]
pub struct Aligner {
    params: AlignParams,
    detector: OrbDetector,
}

impl Aligner {
    pub fn new(params: AlignParams) -> Result<Self, AlignmentError> {
        let detector = OrbDetector::new(params.orb_params())?;
        Ok(Self { params, detector })
    }

    pub fn params(&self) -> &AlignParams {
        &self.params
    }

    /// Warp `moving` onto `reference`; the result always has the reference's dimensions.
    pub fn align(&self, reference: &RgbImage, moving: &RgbImage) -> Result<Alignment, AlignmentError> {
        let span = info_span!("align", reference = ?reference.dimensions(), moving = ?moving.dimensions());
        let _enter = span.enter();

        let reference_gray = imageops::grayscale(reference);
        let moving_gray = imageops::grayscale(moving);

        let (reference_features, moving_features) = rayon::join(
            || self.detector.detect_and_describe(&reference_gray),
            || self.detector.detect_and_describe(&moving_gray),
        );
        debug!(
            reference = reference_features.len(),
            moving = moving_features.len(),
            "keypoints detected"
        );

        if reference_features.len() < MIN_CORRESPONDENCES || moving_features.len() < MIN_CORRESPONDENCES {
            return Err(AlignmentError::InsufficientKeypoints {
                reference: reference_features.len(),
                moving: moving_features.len(),
                needed: MIN_CORRESPONDENCES,
            });
        }

        let mut report = AlignmentReport {
            reference_keypoints: reference_features.len(),
            moving_keypoints: moving_features.len(),
            ..AlignmentReport::default()
        };

        let matches = self.good_matches(&moving_features, &reference_features, &mut report);
        if matches.len() < MIN_CORRESPONDENCES {
            return Err(AlignmentError::InsufficientMatches {
                found: matches.len(),
                needed: MIN_CORRESPONDENCES,
            });
        }

        let (src, dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = matches
            .iter()
            .map(|m| {
                let q = &moving_features.keypoints[m.query_idx];
                let t = &reference_features.keypoints[m.train_idx];
                ([q.x as f64, q.y as f64], [t.x as f64, t.y as f64])
            })
            .unzip();

        let fit = find_homography(&src, &dst, &self.params.ransac)?;
        report.inliers = fit.inlier_count;
        debug!(good = report.good_matches, inliers = report.inliers, "homography estimated");

        let (width, height) = reference.dimensions();
        let aligned = warp_perspective(moving, &fit.matrix, width, height)?;

        Ok(Alignment {
            aligned,
            homography: fit.matrix,
            report,
        })
    }

    /// Ratio-test matches, or the best mutual matches when too few survive
    fn good_matches(&self, moving: &Features, reference: &Features, report: &mut AlignmentReport) -> Vec<DescriptorMatch> {
        let knn = BruteForceMatcher::knn_match(&moving.descriptors, &reference.descriptors, 2);
        let ratio_matches = BruteForceMatcher::ratio_test(&knn, self.params.ratio);
        report.ratio_matches = ratio_matches.len();

        let good = if ratio_matches.len() >= self.params.fallback_min_matches {
            ratio_matches
        } else {
            warn!(
                survivors = ratio_matches.len(),
                needed = self.params.fallback_min_matches,
                "ratio test kept too few matches, falling back to mutual matching"
            );
            report.used_fallback = true;
            let mut mutual = BruteForceMatcher::cross_check_match(&moving.descriptors, &reference.descriptors);
            mutual.sort_by_key(|m| m.distance);
            let keep = fallback_keep_count(mutual.len(), self.params.keep_percent, self.params.fallback_min_matches);
            mutual.truncate(keep);
            mutual
        };

        report.good_matches = good.len();
        good
    }
}

/// `max(floor, ⌊keep_percent · total⌋)`, never more than `total`
fn fallback_keep_count(total: usize, keep_percent: f64, floor: usize) -> usize {
    let by_fraction = (total as f64 * keep_percent).floor() as usize;
    by_fraction.max(floor).min(total)
}

/// Align `moving` to `reference` with default matching settings.
///
/// Returns the warped image only; use [`Aligner`] for the transform and diagnostics.
pub fn align(
    reference: &RgbImage,
    moving: &RgbImage,
    max_features: usize,
    keep_percent: f64,
) -> Result<RgbImage, AlignmentError> {
    let params = AlignParams {
        max_features,
        keep_percent,
        ..AlignParams::default()
    };
    Ok(Aligner::new(params)?.align(reference, moving)?.aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use printcheck_features::FeatureError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn textured(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cols = width / 8 + 1;
        let cells: Vec<[u8; 3]> = (0..cols * (height / 8 + 1)).map(|_| rng.random()).collect();
        RgbImage::from_fn(width, height, |x, y| Rgb(cells[((y / 8) * cols + x / 8) as usize]))
    }

    fn mean_abs_diff(a: &RgbImage, b: &RgbImage, rows: std::ops::Range<u32>, cols: std::ops::Range<u32>) -> f64 {
        let mut sum = 0u64;
        let mut n = 0u64;
        for y in rows {
            for x in cols.clone() {
                let (pa, pb) = (a.get_pixel(x, y), b.get_pixel(x, y));
                for c in 0..3 {
                    sum += (pa[c] as i64 - pb[c] as i64).unsigned_abs();
                }
                n += 3;
            }
        }
        sum as f64 / n as f64
    }

    #[test]
    fn test_fallback_keep_count() {
        assert_eq!(fallback_keep_count(100, 0.2, 12), 20);
        assert_eq!(fallback_keep_count(30, 0.2, 12), 12);
        assert_eq!(fallback_keep_count(5, 0.2, 12), 5);
        assert_eq!(fallback_keep_count(0, 0.2, 12), 0);
    }

    #[test]
    fn test_params_follow_config() {
        let config = DetectionConfig::builder().max_features(800).ransac(3.0, 500).build().unwrap();
        let params = AlignParams::from(&config);
        assert_eq!(params.max_features, 800);
        assert_eq!(params.ransac.reproj_threshold, 3.0);
        assert_eq!(params.ransac.max_iterations, 500);
        assert_eq!(params.fallback_min_matches, 12);
    }

    #[test]
    fn test_invalid_detector_params() {
        let params = AlignParams { max_features: 0, ..AlignParams::default() };
        assert!(matches!(
            Aligner::new(params),
            Err(AlignmentError::Features(FeatureError::InvalidMaxFeatures(0)))
        ));
    }

    #[test]
    fn test_self_alignment_is_identity() {
        let img = textured(200, 200, 21);
        let aligner = Aligner::new(AlignParams::default()).unwrap();
        let result = aligner.align(&img, &img).unwrap();

        assert_eq!(result.aligned.dimensions(), img.dimensions());
        assert!(result.report.inliers >= MIN_CORRESPONDENCES);
        let h = result.homography;
        assert!((h[(0, 2)]).abs() < 0.5 && (h[(1, 2)]).abs() < 0.5, "{h}");
        assert!((h[(0, 0)] - 1.0).abs() < 0.01 && (h[(1, 1)] - 1.0).abs() < 0.01, "{h}");

        assert!(mean_abs_diff(&img, &result.aligned, 10..190, 10..190) < 5.0);
    }

    /// `img` shifted by (dx, dy) with a black border
    fn shifted(img: &RgbImage, dx: u32, dy: u32) -> RgbImage {
        let (w, h) = img.dimensions();
        let mut out = RgbImage::new(w, h);
        for y in dy..h {
            for x in dx..w {
                out.put_pixel(x, y, *img.get_pixel(x - dx, y - dy));
            }
        }
        out
    }

    #[test]
    fn test_translated_image_is_registered() {
        let golden = textured(220, 200, 4);
        let moving = shifted(&golden, 6, 4);

        let params = AlignParams { max_features: 2000, ..AlignParams::default() };
        let result = Aligner::new(params).unwrap().align(&golden, &moving).unwrap();
        assert_eq!(result.aligned.dimensions(), golden.dimensions());

        let h = result.homography;
        assert!((h[(0, 2)] + 6.0).abs() < 0.75 && (h[(1, 2)] + 4.0).abs() < 0.75, "{h}");
        assert!(mean_abs_diff(&golden, &result.aligned, 20..180, 20..200) < 20.0);

        let via_free_fn = align(&golden, &moving, 2000, 0.2).unwrap();
        assert_eq!(via_free_fn, result.aligned);
    }

    #[test]
    fn test_mutual_match_fallback_registers() {
        let golden = textured(220, 200, 4);
        let moving = shifted(&golden, 6, 4);

        let base = AlignParams { max_features: 2000, ..AlignParams::default() };
        let survivors = Aligner::new(base).unwrap().align(&golden, &moving).unwrap().report.ratio_matches;

        // One more than the ratio test can deliver
        let params = AlignParams { fallback_min_matches: survivors + 1, ..base };
        let aligner = Aligner::new(params).unwrap();
        let result = aligner.align(&golden, &moving).unwrap();
        let report = result.report;

        assert!(report.used_fallback);
        assert_eq!(report.ratio_matches, survivors);

        let reference = aligner.detector.detect_and_describe(&imageops::grayscale(&golden));
        let moved = aligner.detector.detect_and_describe(&imageops::grayscale(&moving));
        let mutual = BruteForceMatcher::cross_check_match(&moved.descriptors, &reference.descriptors).len();
        let by_fraction = (mutual as f64 * params.keep_percent).floor() as usize;
        assert_eq!(report.good_matches, by_fraction.max(survivors + 1).min(mutual));

        let h = result.homography;
        assert!((h[(0, 2)] + 6.0).abs() < 0.75 && (h[(1, 2)] + 4.0).abs() < 0.75, "{h}");
        assert!(mean_abs_diff(&golden, &result.aligned, 20..180, 20..200) < 20.0);
    }

    #[test]
    fn test_solid_color_fails() {
        let golden = textured(160, 160, 9);
        let solid = RgbImage::from_pixel(160, 160, Rgb([90, 120, 40]));
        let err = align(&golden, &solid, 1000, 0.2).unwrap_err();
        assert!(matches!(err, AlignmentError::InsufficientKeypoints { moving: 0, .. }));
    }
}
