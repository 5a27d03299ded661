use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

use crate::homography::HomographyError;

const FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// Resample `src` into a `width` x `height` grid through `h` (source → destination).
///
/// Sampling is bilinear. The source is framed by one pixel of black, so
/// neighbours outside it contribute zero and uncovered regions come out black.
pub fn warp_perspective(
    src: &RgbImage,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> Result<RgbImage, HomographyError> {
    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-12 || h.try_inverse().is_none() {
        return Err(HomographyError::Degenerate);
    }
    let n = h / scale;
    let transform = [
        n[(0, 0)] as f32,
        n[(0, 1)] as f32,
        n[(0, 2)] as f32,
        n[(1, 0)] as f32,
        n[(1, 1)] as f32,
        n[(1, 2)] as f32,
        n[(2, 0)] as f32,
        n[(2, 1)] as f32,
        1.0,
    ];
    let projection = Projection::from_matrix(transform).ok_or(HomographyError::Degenerate)?;

    let mut out = RgbImage::from_pixel(width, height, FILL);
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return Ok(out);
    }

    let mut framed = RgbImage::from_pixel(src.width() + 2, src.height() + 2, FILL);
    imageops::replace(&mut framed, src, 1, 1);
    let projection = Projection::translate(-1.0, -1.0).and_then(projection);

    warp_into(&framed, &projection, Interpolation::Bilinear, FILL, &mut out);
    Ok(out)
}
