use imageproc::filter::gaussian_blur_f32;
use printcheck_core::{Descriptor, GrayImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const DESCRIPTOR_BITS: usize = 256;

/// Fixed seed so every generator built for a given patch size shares one pattern
const PATTERN_SEED: u64 = 0x0b1e_f00d;

/// Smoothing applied before the intensity tests
const SMOOTHING_SIGMA: f32 = 2.0;

/// Point-pair test in patch coordinates
type TestPair = (f32, f32, f32, f32);

/// Rotated BRIEF descriptor generator (256 intensity comparisons)
#[derive(Debug, Clone)]
pub struct BriefGenerator {
    pattern: Vec<TestPair>,
}

impl BriefGenerator {
    /// Draw the sampling pattern for a square patch of `patch_size` pixels.
    ///
    /// Points stay two pixels inside the patch so rotated tests remain in it.
    pub fn new(patch_size: usize) -> Self {
        let reach = (patch_size / 2).saturating_sub(2).max(1) as i32;
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED ^ patch_size as u64);
        let pattern = (0..DESCRIPTOR_BITS)
            .map(|_| {
                let mut coord = || rng.random_range(-reach..=reach) as f32;
                (coord(), coord(), coord(), coord())
            })
            .collect();
        Self { pattern }
    }

    /// Smooth a pyramid level before sampling descriptors on it
    pub fn prepare(&self, img: &GrayImage) -> GrayImage {
        gaussian_blur_f32(img, SMOOTHING_SIGMA)
    }

    /// Describe keypoints given as (x, y, angle) on a prepared level image
    pub fn generate_descriptors(&self, smoothed: &GrayImage, kps: &[(f32, f32, f32)]) -> Vec<Descriptor> {
        kps.par_iter()
            .map(|&(cx, cy, angle)| self.describe(smoothed, cx, cy, angle))
            .collect()
    }

    fn describe(&self, img: &GrayImage, cx: f32, cy: f32, angle: f32) -> Descriptor {
        let (s, c) = angle.sin_cos();
        let mut d = [0u8; DESCRIPTOR_BITS / 8];

        for (i, &(dx1, dy1, dx2, dy2)) in self.pattern.iter().enumerate() {
            // Rotate the test into the keypoint frame
            let (rx1, ry1) = (cx + c * dx1 - s * dy1, cy + s * dx1 + c * dy1);
            let (rx2, ry2) = (cx + c * dx2 - s * dy2, cy + s * dx2 + c * dy2);

            let val1 = bilinear_sample(img, rx1, ry1);
            let val2 = bilinear_sample(img, rx2, ry2);

            let bit = (val1 < val2) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        d
    }
}

/// Bilinear interpolation for subpixel sampling, clamped to the image
fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0)[0] as f32;
    let p10 = img.get_pixel(x1, y0)[0] as f32;
    let p01 = img.get_pixel(x0, y1)[0] as f32;
    let p11 = img.get_pixel(x1, y1)[0] as f32;

    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;

    top * (1.0 - dy) + bottom * dy
}
