//! Perceptual color difference (CIE ΔE*76) between two aligned images.

use image::RgbImage;
use palette::{FromColor, Lab, Srgb};
use printcheck_core::DistanceMap;
use rayon::prelude::*;

use crate::error::InputError;

/// Euclidean distance in Lab (ΔE*76)
#[inline]
pub fn delta_e(x: &Lab, y: &Lab) -> f32 {
    let dl = x.l - y.l;
    let da = x.a - y.a;
    let db = x.b - y.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// Convert one 8-bit sRGB pixel to CIE Lab (D65)
#[inline]
pub fn srgb_to_lab(rgb: [u8; 3]) -> Lab {
    Lab::from_color(Srgb::new(rgb[0], rgb[1], rgb[2]).into_linear::<f32>())
}

/// Per-pixel ΔE between two same-sized color images.
///
/// Identical inputs produce an all-zero map; values are never negative.
pub fn compute_distance(a: &RgbImage, b: &RgbImage) -> Result<DistanceMap, InputError> {
    if a.dimensions() != b.dimensions() {
        return Err(InputError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    let (width, height) = a.dimensions();
    let mut map = DistanceMap::new(width, height);
    if width == 0 || height == 0 {
        return Ok(map);
    }

    let w = width as usize;
    map.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let pa = a.get_pixel(x as u32, y as u32).0;
            let pb = b.get_pixel(x as u32, y as u32).0;
            *out = if pa == pb {
                0.0
            } else {
                delta_e(&srgb_to_lab(pa), &srgb_to_lab(pb))
            };
        }
    });

    Ok(map)
}
