//! Display artifacts built from the distance map and defect masks.

use image::{GrayImage, Luma, Rgb, RgbImage};
use printcheck_core::{DefectMask, DistanceMap, MASK_ON};

use crate::error::InputError;

/// Highlight used for defect pixels in the overlay
pub const DEFECT_HIGHLIGHT: Rgb<u8> = Rgb([255, 0, 0]);

/// Weight of the golden image in the heatmap blend; the colormap gets the rest
pub const HEATMAP_BASE_WEIGHT: f32 = 0.6;

fn ensure_same_size(left: (u32, u32), right: (u32, u32)) -> Result<(), InputError> {
    if left == right {
        Ok(())
    } else {
        Err(InputError::DimensionMismatch { left, right })
    }
}

/// Linear min-max stretch to 0-255; a constant map uses a divisor of 1
pub fn normalize_distance_map(map: &DistanceMap) -> GrayImage {
    let raw = map.as_raw();
    let (min, max) = raw
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if raw.is_empty() || max - min <= 0.0 { 1.0 } else { max - min };

    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        let v = (map.get_pixel(x, y)[0] - min) / range * 255.0;
        // Truncates, like a plain 8-bit cast
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

/// Raw distances as 8-bit gray, saturating at 255
pub fn distance_map_to_gray(map: &DistanceMap) -> GrayImage {
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        Luma([map.get_pixel(x, y)[0].clamp(0.0, 255.0) as u8])
    })
}

/// Blue → cyan → yellow → red false color for an 8-bit intensity
pub fn jet(value: u8) -> Rgb<u8> {
    let t = value as f32 / 255.0;
    let channel = |centre: f32| {
        let v = (1.5 - (4.0 * t - centre).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// False-color the normalized map and blend it over the golden image
pub fn render_heatmap(normalized: &GrayImage, golden: &RgbImage) -> Result<RgbImage, InputError> {
    ensure_same_size(normalized.dimensions(), golden.dimensions())?;
    let heat_weight = 1.0 - HEATMAP_BASE_WEIGHT;

    Ok(RgbImage::from_fn(golden.width(), golden.height(), |x, y| {
        let Rgb(base) = *golden.get_pixel(x, y);
        let Rgb(heat) = jet(normalized.get_pixel(x, y)[0]);
        let mix = |c: usize| {
            (base[c] as f32 * HEATMAP_BASE_WEIGHT + heat[c] as f32 * heat_weight)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb([mix(0), mix(1), mix(2)])
    }))
}

/// Copy of `aligned` with every masked pixel painted `color`
pub fn render_overlay(aligned: &RgbImage, mask: &DefectMask, color: Rgb<u8>) -> Result<RgbImage, InputError> {
    ensure_same_size(aligned.dimensions(), mask.dimensions())?;
    let mut overlay = aligned.clone();
    for (x, y, px) in overlay.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == MASK_ON {
            *px = color;
        }
    }
    Ok(overlay)
}

/// Percentage of foreground pixels, 0 for an empty mask
pub fn filtered_area_percent(mask: &DefectMask) -> f64 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let on = mask.as_raw().iter().filter(|&&v| v == MASK_ON).count();
    100.0 * on as f64 / total as f64
}
