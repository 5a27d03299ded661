use image::{GrayImage, RgbImage};
use printcheck_core::{DefectMask, DetectionConfig, DistanceMap};
use tracing::{debug, info, info_span};

use crate::align::{AlignParams, Aligner, AlignmentReport};
use crate::classify::{classify, threshold_mask, Thresholds};
use crate::color::compute_distance;
use crate::compose::{
    distance_map_to_gray, filtered_area_percent, normalize_distance_map, render_heatmap, render_overlay,
    DEFECT_HIGHLIGHT,
};
use crate::error::{InputError, InspectResult};
use crate::noise::{filter_mask, NoiseFilterParams};

/// Quantitative result of one inspection
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Summary {
    pub is_defect: bool,
    /// Mean ΔE over the golden frame
    pub mean_diff: f64,
    pub max_diff: f64,
    /// Percent of pixels above the per-pixel threshold, before noise filtering
    pub area_percent: f64,
    /// Percent of pixels left in the filtered mask
    pub filtered_percent: f64,
}

/// Intermediate and display images, all in the golden image's frame
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub aligned: RgbImage,
    pub distance_map: DistanceMap,
    /// Raw ΔE values truncated to 8 bits
    pub distance_map_gray: GrayImage,
    /// ΔE stretched to 0-255
    pub normalized: GrayImage,
    pub unfiltered_mask: DefectMask,
    pub filtered_mask: DefectMask,
    pub overlay: RgbImage,
    pub heatmap: RgbImage,
}

/// Everything produced by [`Inspector::inspect`]
#[derive(Debug, Clone)]
pub struct InspectionReport {
    pub summary: Summary,
    pub alignment: AlignmentReport,
    pub artifacts: Artifacts,
}

/// Golden-sample print inspection with a fixed configuration
#[derive(Debug, Clone)]
pub struct Inspector {
    config: DetectionConfig,
    aligner: Aligner,
    thresholds: Thresholds,
    noise: NoiseFilterParams,
}

impl Inspector {
    /// Validate `config` once and prepare the stages
    pub fn new(config: DetectionConfig) -> InspectResult<Self> {
        config.validate()?;
        let aligner = Aligner::new(AlignParams::from(&config))?;
        Ok(Self {
            thresholds: Thresholds::from(&config),
            noise: NoiseFilterParams::from(&config),
            aligner,
            config,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Compare `test` against `golden`.
    ///
    /// Either the full report is returned or an error; no partial results.
    pub fn inspect(&self, golden: &RgbImage, test: &RgbImage) -> InspectResult<InspectionReport> {
        let span = info_span!("inspect", golden = ?golden.dimensions(), test = ?test.dimensions());
        let _enter = span.enter();

        ensure_not_empty("golden", golden)?;
        ensure_not_empty("test", test)?;

        let alignment = self.aligner.align(golden, test)?;

        let distance_map = info_span!("delta_e").in_scope(|| compute_distance(golden, &alignment.aligned))?;
        let stats = classify(&distance_map, &self.thresholds);
        debug!(mean = stats.mean, max = stats.max, area = stats.area_percent, "distance statistics");

        let unfiltered_mask = threshold_mask(&distance_map, self.thresholds.pixel_threshold);
        let filtered_mask = info_span!("noise_filter").in_scope(|| filter_mask(&unfiltered_mask, &self.noise));

        let normalized = normalize_distance_map(&distance_map);
        let heatmap = render_heatmap(&normalized, golden)?;
        let overlay = render_overlay(&alignment.aligned, &filtered_mask, DEFECT_HIGHLIGHT)?;

        let summary = Summary {
            is_defect: stats.is_defect,
            mean_diff: stats.mean,
            max_diff: stats.max,
            area_percent: stats.area_percent,
            filtered_percent: filtered_area_percent(&filtered_mask),
        };
        info!(
            is_defect = summary.is_defect,
            mean_diff = summary.mean_diff,
            max_diff = summary.max_diff,
            area_percent = summary.area_percent,
            filtered_percent = summary.filtered_percent,
            "inspection finished"
        );

        Ok(InspectionReport {
            summary,
            alignment: alignment.report,
            artifacts: Artifacts {
                aligned: alignment.aligned,
                distance_map_gray: distance_map_to_gray(&distance_map),
                distance_map,
                normalized,
                unfiltered_mask,
                filtered_mask,
                overlay,
                heatmap,
            },
        })
    }
}

fn ensure_not_empty(which: &'static str, img: &RgbImage) -> Result<(), InputError> {
    if img.width() == 0 || img.height() == 0 {
        Err(InputError::EmptyImage(which))
    } else {
        Ok(())
    }
}

/// One-shot inspection with `config`
pub fn inspect(golden: &RgbImage, test: &RgbImage, config: &DetectionConfig) -> InspectResult<InspectionReport> {
    Inspector::new(config.clone())?.inspect(golden, test)
}
