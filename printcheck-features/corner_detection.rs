use printcheck_core::GrayImage;
use rayon::prelude::*;

use crate::utils::has_consecutive_pixels;

/// Minimum contiguous arc length on the circle (FAST-9)
const FAST_ARC: usize = 9;

/// Harris window half-size (7x7 block) and sensitivity
const HARRIS_RADIUS: i32 = 3;
const HARRIS_K: f32 = 0.04;

/// Corner candidate at integer level coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    pub response: f32,
}

/// Corner detection algorithms (FAST and Harris)
pub struct CornerDetector;

impl CornerDetector {
    /// FAST circle offsets for corner detection
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Detect FAST-9 corners scored by Harris response, then keep 3x3 local maxima.
    ///
    /// Only pixels at least `border` away from every edge are tested.
    pub fn detect(img: &GrayImage, threshold: u8, border: u32) -> Vec<Corner> {
        let (w, h) = img.dimensions();
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let raw: Vec<Corner> = (border..h - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in border..w - border {
                    if Self::is_fast_corner(img, x, y, threshold) {
                        let response = Self::harris_response(img, x, y);
                        if response > 0.0 {
                            row.push(Corner { x, y, response });
                        }
                    }
                }
                row
            })
            .collect();

        Self::non_maximum_suppression(&raw, w, h)
    }

    /// Check if a pixel is a FAST corner
    pub fn is_fast_corner(img: &GrayImage, x: u32, y: u32, threshold: u8) -> bool {
        let p = img.get_pixel(x, y)[0];
        let bright_limit = p.saturating_add(threshold);
        let dark_limit = p.saturating_sub(threshold);

        let mut brighter = [false; 16];
        let mut darker = [false; 16];
        for (i, &(dx, dy)) in Self::FAST_OFFSETS.iter().enumerate() {
            let q = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
            brighter[i] = q > bright_limit;
            darker[i] = q < dark_limit;
        }

        has_consecutive_pixels(&brighter, FAST_ARC) || has_consecutive_pixels(&darker, FAST_ARC)
    }

    /// Harris corner response det(M) - k * trace(M)^2 over a 7x7 window
    pub fn harris_response(img: &GrayImage, x: u32, y: u32) -> f32 {
        let (w, h) = img.dimensions();
        let reach = (HARRIS_RADIUS + 1) as u32;
        if x < reach || y < reach || x + reach >= w || y + reach >= h {
            return 0.0;
        }

        let mut ixx = 0.0f64;
        let mut ixy = 0.0f64;
        let mut iyy = 0.0f64;

        for dy in -HARRIS_RADIUS..=HARRIS_RADIUS {
            for dx in -HARRIS_RADIUS..=HARRIS_RADIUS {
                let nx = (x as i32 + dx) as u32;
                let ny = (y as i32 + dy) as u32;
                let (gx, gy) = Self::sobel(img, nx, ny);
                ixx += (gx * gx) as f64;
                ixy += (gx * gy) as f64;
                iyy += (gy * gy) as f64;
            }
        }

        let det = ixx * iyy - ixy * ixy;
        let trace = ixx + iyy;
        let response = det - HARRIS_K as f64 * trace * trace;

        // Edges and flat regions score <= 0
        if response > 0.0 {
            response as f32
        } else {
            0.0
        }
    }

    /// Sobel gradients, normalized to intensity units; caller keeps (x, y) off the border
    fn sobel(img: &GrayImage, x: u32, y: u32) -> (f32, f32) {
        let p = |dx: i32, dy: i32| img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32;

        let gx = p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1);
        let gy = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1);

        (gx / 8.0, gy / 8.0)
    }

    /// Keep corners whose response is maximal in their 3x3 neighbourhood.
    ///
    /// Equal neighbours are resolved in raster order so plateaus keep one corner.
    pub fn non_maximum_suppression(corners: &[Corner], width: u32, height: u32) -> Vec<Corner> {
        if corners.is_empty() {
            return Vec::new();
        }

        let mut grid = vec![0.0f32; width as usize * height as usize];
        for c in corners {
            grid[c.y as usize * width as usize + c.x as usize] = c.response;
        }

        corners
            .iter()
            .filter(|c| {
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = c.x as i32 + dx;
                        let ny = c.y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let other = grid[ny as usize * width as usize + nx as usize];
                        let earlier = dy < 0 || (dy == 0 && dx < 0);
                        if other > c.response || (earlier && other == c.response) {
                            return false;
                        }
                    }
                }
                true
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn create_test_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([128]))
    }

    fn create_square_image(width: u32, height: u32) -> GrayImage {
        // Dark background with a bright square: four strong corners
        let mut img = GrayImage::from_pixel(width, height, Luma([50]));
        let (x0, y0) = (width / 2 - 8, height / 2 - 8);
        for y in y0..y0 + 16 {
            for x in x0..x0 + 16 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        img
    }

    #[test]
    fn test_uniform_image_has_no_corners() {
        let img = create_test_image(64, 64);
        assert!(CornerDetector::detect(&img, 20, 5).is_empty());
    }

    #[test]
    fn test_square_corners_detected() {
        let img = create_square_image(64, 64);
        let corners = CornerDetector::detect(&img, 20, 5);
        assert!(!corners.is_empty());

        // Every surviving corner sits near one of the four square corners
        let targets = [(24.0, 24.0), (39.0, 24.0), (24.0, 39.0), (39.0, 39.0)];
        for c in &corners {
            let near = targets
                .iter()
                .any(|&(tx, ty)| (c.x as f32 - tx).abs() <= 3.0 && (c.y as f32 - ty).abs() <= 3.0);
            assert!(near, "unexpected corner at ({}, {})", c.x, c.y);
            assert!(c.response > 0.0 && c.response.is_finite());
        }
    }

    #[test]
    fn test_border_is_respected() {
        let img = create_square_image(64, 64);
        for c in CornerDetector::detect(&img, 20, 10) {
            assert!(c.x >= 10 && c.x < 54 && c.y >= 10 && c.y < 54);
        }
        assert!(CornerDetector::detect(&img, 20, 32).is_empty());
    }

    #[test]
    fn test_edge_has_no_harris_response() {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 0 } else { 255 }]));
        assert_eq!(CornerDetector::harris_response(&img, 16, 16), 0.0);
    }

    #[test]
    fn test_non_maximum_suppression_keeps_local_maxima() {
        let corners = vec![
            Corner { x: 5, y: 5, response: 1.0 },
            Corner { x: 6, y: 5, response: 3.0 },
            Corner { x: 7, y: 6, response: 2.0 },
            Corner { x: 20, y: 20, response: 0.5 },
            Corner { x: 30, y: 30, response: 4.0 },
            Corner { x: 31, y: 30, response: 4.0 },
        ];
        let kept = CornerDetector::non_maximum_suppression(&corners, 40, 40);
        let positions: Vec<(u32, u32)> = kept.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(positions, vec![(6, 5), (20, 20), (30, 30)]);
    }
}
