//! Morphological cleanup and shape filtering of raw defect masks.

use image::{imageops, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::arc_length;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use imageproc::point::Point;
use printcheck_core::{DefectMask, DetectionConfig, MASK_ON};
use tracing::debug;

/// Noise filter settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFilterParams {
    /// Smallest contour area kept, in square pixels
    pub min_size: f64,
    /// Circularity floor for contours in the small-size band
    pub min_circularity: f64,
    pub open_kernel: u32,
    pub open_iters: u32,
    pub close_kernel: u32,
    pub close_iters: u32,
    /// Contours below `min_size * circularity_area_factor` are shape-tested
    pub circularity_area_factor: f64,
}

impl From<&DetectionConfig> for NoiseFilterParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            min_size: config.min_defect_size,
            min_circularity: config.min_circularity,
            open_kernel: config.morph_open_kernel_size,
            open_iters: config.morph_open_iterations,
            close_kernel: config.morph_close_kernel_size,
            close_iters: config.morph_close_iterations,
            circularity_area_factor: config.circularity_area_factor,
        }
    }
}

/// Elliptical structuring element inscribed in a `size` x `size` box.
///
/// Row `i` spans `round(c * sqrt(1 - dy²/r²))` pixels either side of the
/// centre column, with `r = c = size / 2` and `dy = i - r`.
pub fn elliptical_element(size: u32) -> DefectMask {
    let size = size.max(1);
    let r = (size / 2) as i64;
    let c = (size / 2) as i64;
    let mut element = DefectMask::new(size, size);

    for i in 0..size as i64 {
        let dy = i - r;
        if dy.abs() > r {
            continue;
        }
        let dx = if r == 0 {
            0
        } else {
            let t = ((r * r - dy * dy) as f64 / (r * r) as f64).sqrt();
            (c as f64 * t).round() as i64
        };
        let start = (c - dx).max(0);
        let end = (c + dx + 1).min(size as i64);
        for j in start..end {
            element.put_pixel(j as u32, i as u32, Luma([MASK_ON]));
        }
    }
    element
}

fn structuring_mask(size: u32) -> Mask {
    let centre = (size.max(1) / 2) as u8;
    Mask::from_image(&elliptical_element(size), centre, centre)
}

/// `iters` erosions followed by `iters` dilations
pub fn open(mask: &DefectMask, kernel: u32, iters: u32) -> DefectMask {
    let element = structuring_mask(kernel);
    let mut out = mask.clone();
    for _ in 0..iters {
        out = grayscale_erode(&out, &element);
    }
    for _ in 0..iters {
        out = grayscale_dilate(&out, &element);
    }
    out
}

/// `iters` dilations followed by `iters` erosions
pub fn close(mask: &DefectMask, kernel: u32, iters: u32) -> DefectMask {
    let element = structuring_mask(kernel);
    let mut out = mask.clone();
    for _ in 0..iters {
        out = grayscale_dilate(&out, &element);
    }
    for _ in 0..iters {
        out = grayscale_erode(&out, &element);
    }
    out
}

/// Area enclosed by a closed boundary polygon (shoelace formula)
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// 4π·area / perimeter², or `None` for a zero-length boundary
pub fn circularity(area: f64, perimeter: f64) -> Option<f64> {
    if perimeter > 0.0 {
        Some(4.0 * std::f64::consts::PI * area / (perimeter * perimeter))
    } else {
        None
    }
}

fn keep_contour(contour: &Contour<i32>, params: &NoiseFilterParams) -> bool {
    let area = contour_area(&contour.points);
    if area < params.min_size {
        return false;
    }
    if area >= params.circularity_area_factor * params.min_size {
        return true;
    }
    let perimeter = arc_length(&contour.points, true);
    circularity(area, perimeter).map_or(false, |c| c >= params.min_circularity)
}

fn fill_contour(canvas: &mut DefectMask, points: &[Point<i32>]) {
    let mut poly: &[Point<i32>] = points;
    // The polygon must not repeat its first vertex at the end
    while poly.len() > 1 && poly.first() == poly.last() {
        poly = &poly[..poly.len() - 1];
    }
    if poly.len() >= 3 {
        draw_polygon_mut(canvas, poly, Luma([MASK_ON]));
    } else {
        for p in poly {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < canvas.width() && (p.y as u32) < canvas.height() {
                canvas.put_pixel(p.x as u32, p.y as u32, Luma([MASK_ON]));
            }
        }
    }
}

/// Clean a raw defect mask.
///
/// Opening removes speckle narrower than the element, closing fills small
/// gaps, then each external contour is kept or dropped by size and shape and
/// the survivors are drawn back filled. The result has the input's size.
pub fn filter_mask(raw: &DefectMask, params: &NoiseFilterParams) -> DefectMask {
    let (width, height) = raw.dimensions();
    let mut filtered = DefectMask::new(width, height);
    if width == 0 || height == 0 {
        return filtered;
    }

    let opened = open(raw, params.open_kernel, params.open_iters);
    let cleaned = close(&opened, params.close_kernel, params.close_iters);

    // Regions touching the frame only get an outer border inside a background margin
    let mut framed = DefectMask::new(width + 2, height + 2);
    imageops::replace(&mut framed, &cleaned, 1, 1);
    let contours: Vec<Contour<i32>> = find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|mut c| {
            for p in &mut c.points {
                p.x -= 1;
                p.y -= 1;
            }
            c
        })
        .collect();

    let mut kept = 0usize;
    for contour in &contours {
        if keep_contour(contour, params) {
            fill_contour(&mut filtered, &contour.points);
            kept += 1;
        }
    }
    debug!(contours = contours.len(), kept, "noise filter");

    filtered
}
