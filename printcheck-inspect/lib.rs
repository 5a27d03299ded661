//! Golden-sample print defect detection.
//!
//! The pipeline aligns a test photo onto the golden photo, measures the
//! per-pixel CIE ΔE between them, classifies the result against fixed limits
//! and cleans the hot-pixel mask before building display artifacts.
//!
//! ```no_run
//! use printcheck_core::DetectionConfig;
//! use printcheck_inspect::Inspector;
//!
//! let golden = image::open("golden.jpg").unwrap().to_rgb8();
//! let test = image::open("test.jpg").unwrap().to_rgb8();
//! let inspector = Inspector::new(DetectionConfig::default()).unwrap();
//! let report = inspector.inspect(&golden, &test).unwrap();
//! println!("defect: {}", report.summary.is_defect);
//! ```

pub mod align;
pub mod classify;
pub mod color;
pub mod compose;
pub mod error;
pub mod homography;
pub mod noise;
pub mod pipeline;
pub mod warp;

pub use align::{align, AlignParams, Aligner, Alignment, AlignmentReport};
pub use classify::{classify, threshold_mask, Classification, Thresholds};
pub use color::{compute_distance, delta_e, srgb_to_lab};
pub use compose::{
    distance_map_to_gray, filtered_area_percent, normalize_distance_map, render_heatmap, render_overlay,
    DEFECT_HIGHLIGHT,
};
pub use error::{AlignmentError, InputError, InspectError, InspectResult};
pub use homography::{find_homography, HomographyError, HomographyFit, RansacParams};
pub use noise::{filter_mask, NoiseFilterParams};
pub use pipeline::{inspect, Artifacts, InspectionReport, Inspector, Summary};
