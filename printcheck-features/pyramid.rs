use image::imageops::{self, FilterType};
use printcheck_core::GrayImage;
use rayon::prelude::*;

use crate::types::ScaleLevel;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate scale levels for image pyramid.
    ///
    /// Levels whose smaller side cannot hold a detection window of
    /// `2 * border + 1` pixels are dropped, so tiny images yield no levels.
    pub fn generate_scale_levels(
        width: u32,
        height: u32,
        max_levels: usize,
        scale_factor: f32,
        border: u32,
    ) -> Vec<ScaleLevel> {
        let min_side = 2 * border + 1;
        let mut levels = Vec::with_capacity(max_levels);
        let mut current_scale = 1.0f32;

        for level in 0..max_levels {
            let scaled_width = ((width as f32) / current_scale).round() as u32;
            let scaled_height = ((height as f32) / current_scale).round() as u32;

            if scaled_width < min_side || scaled_height < min_side {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build image pyramid from base image
    pub fn build_image_pyramid(img: &GrayImage, scale_levels: &[ScaleLevel]) -> Vec<GrayImage> {
        scale_levels
            .par_iter()
            .map(|scale_level| {
                if scale_level.level == 0 {
                    img.clone()
                } else {
                    imageops::resize(img, scale_level.width, scale_level.height, FilterType::Triangle)
                }
            })
            .collect()
    }

    /// Split `total` features across levels geometrically, coarser levels getting fewer
    pub fn features_per_level(total: usize, n_levels: usize, scale_factor: f32) -> Vec<usize> {
        if n_levels == 0 {
            return Vec::new();
        }
        let factor = 1.0 / scale_factor as f64;
        let mut desired = if n_levels == 1 {
            total as f64
        } else {
            total as f64 * (1.0 - factor) / (1.0 - factor.powi(n_levels as i32))
        };

        let mut budgets = Vec::with_capacity(n_levels);
        let mut assigned = 0usize;
        for _ in 0..n_levels - 1 {
            let n = (desired.round() as usize).min(total - assigned);
            budgets.push(n);
            assigned += n;
            desired *= factor;
        }
        budgets.push(total - assigned);
        budgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_shrink_geometrically() {
        let levels = ImagePyramid::generate_scale_levels(640, 480, 8, 1.2, 19);
        assert_eq!(levels.len(), 8);
        assert_eq!((levels[0].width, levels[0].height), (640, 480));
        for pair in levels.windows(2) {
            assert!(pair[1].width < pair[0].width);
            assert!((pair[1].scale / pair[0].scale - 1.2).abs() < 1e-4);
        }
    }

    #[test]
    fn test_small_image_has_no_levels() {
        assert!(ImagePyramid::generate_scale_levels(30, 30, 8, 1.2, 19).is_empty());
        assert_eq!(ImagePyramid::generate_scale_levels(50, 50, 8, 1.2, 19).len(), 2);
    }

    #[test]
    fn test_pyramid_images_match_levels() {
        let img = GrayImage::from_fn(120, 90, |x, y| image::Luma([((x * 7 + y * 3) % 256) as u8]));
        let levels = ImagePyramid::generate_scale_levels(120, 90, 4, 1.5, 10);
        let pyramid = ImagePyramid::build_image_pyramid(&img, &levels);

        assert_eq!(pyramid.len(), levels.len());
        assert_eq!(pyramid[0], img);
        for (level, scaled) in levels.iter().zip(&pyramid) {
            assert_eq!(scaled.dimensions(), (level.width, level.height));
        }
    }

    #[test]
    fn test_feature_budget_sums_to_total() {
        let budgets = ImagePyramid::features_per_level(5000, 8, 1.2);
        assert_eq!(budgets.len(), 8);
        assert_eq!(budgets.iter().sum::<usize>(), 5000);
        assert!(budgets[0] > budgets[7]);

        assert_eq!(ImagePyramid::features_per_level(10, 1, 1.2), vec![10]);
        assert!(ImagePyramid::features_per_level(10, 0, 1.2).is_empty());
    }
}
