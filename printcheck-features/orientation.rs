use printcheck_core::GrayImage;

/// Intensity-centroid orientation over a circular patch
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    radius: i32,
    /// Half-width of the circular patch for each row offset 0..=radius
    umax: Vec<i32>,
}

impl OrientationEstimator {
    pub fn new(patch_size: usize) -> Self {
        let radius = (patch_size / 2) as i32;
        let r2 = (radius * radius) as f64;
        let umax = (0..=radius)
            .map(|v| (r2 - (v * v) as f64).sqrt().floor() as i32)
            .collect();
        Self { radius, umax }
    }

    /// Angle (radians) of the vector from (x, y) to the patch's intensity centroid.
    ///
    /// Samples outside the image are clamped to the nearest edge pixel.
    pub fn compute(&self, img: &GrayImage, x: u32, y: u32) -> f32 {
        let (w, h) = img.dimensions();
        let (cx, cy) = (x as i32, y as i32);
        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for dy in -self.radius..=self.radius {
            let yy = (cy + dy).clamp(0, h as i32 - 1) as u32;
            let half = self.umax[dy.unsigned_abs() as usize];
            for dx in -half..=half {
                let xx = (cx + dx).clamp(0, w as i32 - 1) as u32;
                let val = img.get_pixel(xx, yy)[0] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }
}
