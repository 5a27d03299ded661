//! Disk-backed inspection sessions and CLI configuration.
//!
//! A session loads the golden and test photos, runs the in-memory pipeline
//! and persists every artifact under `OUTPUT_DIR/session_DD-MM-YYYY(HH-MM-SS)`.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ExtendedColorType, RgbImage};
use printcheck_core::{ConfigError, DetectionConfig};
use printcheck_inspect::{AlignmentReport, InputError, InspectError, Inspector, Summary};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Inspect(#[from] InspectError),
    #[error("failed to write {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report")]
    Json(#[from] serde_json::Error),
    #[error("failed to configure worker threads")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type CliResult<T> = Result<T, CliError>;

/// Contents of a printcheck configuration file: detection parameters plus
/// default input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub golden_sample: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_sample: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub detection: DetectionConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            golden_sample: None,
            test_sample: None,
            output_dir: PathBuf::from("output"),
            detection: DetectionConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load from a `.json` file, or TOML for any other extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CliConfig = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(&text)?,
            _ => toml::from_str(&text)?,
        };
        config.detection.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Command-line paths win; otherwise fall back to the configured samples
    pub fn resolve_inputs(&self, golden: Option<PathBuf>, test: Option<PathBuf>) -> Option<(PathBuf, PathBuf)> {
        match (golden, test) {
            (Some(g), Some(t)) => Some((g, t)),
            _ => Some((self.golden_sample.clone()?, self.test_sample.clone()?)),
        }
    }
}

/// Read an image file as 8-bit RGB
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, InputError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(InputError::MissingPath(path.to_path_buf()));
    }
    let img = image::open(path).map_err(|source| InputError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Configure the global rayon pool; must run before any parallel work
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new().num_threads(n_threads).build_global()
}

/// Timestamped output directory of one disk-backed run
#[derive(Debug, Clone)]
pub struct Session {
    dir: PathBuf,
}

impl Session {
    /// Create `base/session_DD-MM-YYYY(HH-MM-SS)` (and `base` if needed)
    pub fn create(base: impl AsRef<Path>) -> CliResult<Self> {
        let stamp = chrono::Local::now().format("session_%d-%m-%Y(%H-%M-%S)");
        let dir = base.as_ref().join(stamp.to_string());
        fs::create_dir_all(&dir).map_err(|source| CliError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save(&self, name: &str, data: &[u8], (width, height): (u32, u32), color: ExtendedColorType) -> CliResult<()> {
        let path = self.dir.join(name);
        image::save_buffer(&path, data, width, height, color).map_err(|source| CliError::Save { path, source })
    }

    pub fn save_rgb(&self, name: &str, img: &RgbImage) -> CliResult<()> {
        self.save(name, img.as_raw(), img.dimensions(), ExtendedColorType::Rgb8)
    }

    pub fn save_gray(&self, name: &str, img: &image::GrayImage) -> CliResult<()> {
        self.save(name, img.as_raw(), img.dimensions(), ExtendedColorType::L8)
    }

    pub fn write_text(&self, name: &str, text: &str) -> CliResult<()> {
        let path = self.dir.join(name);
        fs::write(&path, text).map_err(|source| CliError::Io { path, source })
    }
}

/// Result of a disk-backed run
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_dir: PathBuf,
    pub summary: Summary,
    pub alignment: AlignmentReport,
}

/// Human-readable summary block
pub fn format_summary(summary: &Summary, session_dir: Option<&Path>) -> String {
    let saved_to = session_dir
        .map(|dir| format!("All outputs saved to: {}\n", dir.display()))
        .unwrap_or_default();
    format!(
        "===== DEFECT DETECTION SUMMARY =====\n\
         Is defect (pre-filter): {}\n\
         Mean ΔE: {:.2}, Max ΔE: {:.2}, Area %: {:.2}\n\
         Defect area after filtering: {:.2}%\n\
         {saved_to}\
         ===================================\n",
        summary.is_defect, summary.mean_diff, summary.max_diff, summary.area_percent, summary.filtered_percent,
    )
}

/// Load both images, inspect them and persist every artifact in a new session.
///
/// The inputs are written before the pipeline runs, so a failed run still
/// leaves them in the session directory.
pub fn run_disk_session(
    golden_path: &Path,
    test_path: &Path,
    config: &DetectionConfig,
    output_base: &Path,
) -> CliResult<SessionOutcome> {
    let inspector = Inspector::new(config.clone())?;
    let golden = load_image(golden_path)?;
    let test = load_image(test_path)?;

    let session = Session::create(output_base)?;
    let span = info_span!("session", dir = %session.dir().display());
    let _enter = span.enter();

    session.save_rgb("01_test_image.jpg", &test)?;
    session.save_rgb("02_golden_sample.jpg", &golden)?;

    let report = inspector.inspect(&golden, &test)?;
    let art = &report.artifacts;

    session.save_rgb("03_aligned_test.jpg", &art.aligned)?;
    session.save_gray("04_delta_e_map.jpg", &art.distance_map_gray)?;
    session.save_gray("04a_delta_e_normalized_map.jpg", &art.normalized)?;
    session.save_gray("05_defects_unfiltered.jpg", &art.unfiltered_mask)?;
    session.save_gray("06_defects_filtered.jpg", &art.filtered_mask)?;
    session.save_rgb("07_defect_overlay.jpg", &art.overlay)?;
    session.save_rgb("08_final_heatmap.jpg", &art.heatmap)?;
    session.write_text("summary.txt", &format_summary(&report.summary, Some(session.dir())))?;
    info!("artifacts written");

    Ok(SessionOutcome {
        session_dir: session.dir().to_path_buf(),
        summary: report.summary,
        alignment: report.alignment,
    })
}
