use printcheck_core::{DefectMask, DetectionConfig, DistanceMap, MASK_ON};

/// Limits that turn a distance map into a defect verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub mean_diff: f64,
    pub max_diff: f64,
    /// Percent of hot pixels tolerated
    pub area_percent: f64,
    /// Distance above which a single pixel is hot
    pub pixel_threshold: f64,
}

impl From<&DetectionConfig> for Thresholds {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            mean_diff: config.mean_diff,
            max_diff: config.max_diff,
            area_percent: config.area_percent,
            pixel_threshold: config.delta_e_pixel_threshold,
        }
    }
}

/// Summary statistics of a distance map and the resulting verdict
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Classification {
    pub is_defect: bool,
    pub mean: f64,
    pub max: f64,
    pub area_percent: f64,
}

/// Aggregate `map` and flag a defect when any single limit is exceeded.
///
/// An empty map is never a defect and reports zero statistics.
pub fn classify(map: &DistanceMap, thresholds: &Thresholds) -> Classification {
    let total = map.as_raw().len();
    if total == 0 {
        return Classification::default();
    }

    let mut sum = 0.0f64;
    let mut max = 0.0f64;
    let mut hot = 0usize;
    for &v in map.as_raw() {
        let v = v as f64;
        sum += v;
        max = max.max(v);
        if v > thresholds.pixel_threshold {
            hot += 1;
        }
    }

    let mean = sum / total as f64;
    let area_percent = 100.0 * hot as f64 / total as f64;
    let is_defect =
        mean > thresholds.mean_diff || max > thresholds.max_diff || area_percent > thresholds.area_percent;

    Classification { is_defect, mean, max, area_percent }
}

/// Raw defect mask: foreground wherever the distance exceeds `pixel_threshold`
pub fn threshold_mask(map: &DistanceMap, pixel_threshold: f64) -> DefectMask {
    DefectMask::from_fn(map.width(), map.height(), |x, y| {
        let hot = map.get_pixel(x, y)[0] as f64 > pixel_threshold;
        image::Luma([if hot { MASK_ON } else { 0 }])
    })
}
