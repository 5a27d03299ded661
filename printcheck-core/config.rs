use crate::error::{ConfigError, ConfigResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complete parameter set for one inspection run.
///
/// The struct is a flat key/value mapping; with the `serde` feature it
/// (de)serializes with upper-case keys such as `ORB_MAX_FEATURES`, and keys
/// missing from a file keep their default value. A run never mutates its
/// configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE", default))]
pub struct DetectionConfig {
    /// Cap on detected keypoints per image
    pub orb_max_features: usize,
    /// Fraction of mutual matches kept when the ratio test falls short
    pub orb_keep_percent: f64,
    /// Per-pixel ΔE above which a pixel counts as "hot"
    pub delta_e_pixel_threshold: f64,
    /// Classifier limits
    pub mean_diff: f64,
    pub max_diff: f64,
    pub area_percent: f64,
    /// Noise filter shape limits
    pub min_defect_size: f64,
    pub min_circularity: f64,
    /// Morphology
    pub morph_open_kernel_size: u32,
    pub morph_open_iterations: u32,
    pub morph_close_kernel_size: u32,
    pub morph_close_iterations: u32,
    /// Lowe ratio used by the k-nearest match filter
    pub ratio_test: f64,
    /// Ratio-test survivors below which mutual matching takes over; also the
    /// minimum number of fallback matches kept
    pub fallback_min_matches: usize,
    /// RANSAC inlier distance in pixels
    pub ransac_reproj_threshold: f64,
    pub ransac_max_iterations: usize,
    pub ransac_seed: u64,
    /// Contours smaller than `factor * min_defect_size` must pass the circularity test
    pub circularity_area_factor: f64,
    /// Feature detector tuning
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub pyramid_scale_factor: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            orb_max_features: 5000,
            orb_keep_percent: 0.20,
            delta_e_pixel_threshold: 10.0,
            mean_diff: 6.0,
            max_diff: 25.0,
            area_percent: 3.0,
            min_defect_size: 50.0,
            min_circularity: 0.15,
            morph_open_kernel_size: 5,
            morph_open_iterations: 1,
            morph_close_kernel_size: 5,
            morph_close_iterations: 1,
            ratio_test: 0.75,
            fallback_min_matches: 12,
            ransac_reproj_threshold: 5.0,
            ransac_max_iterations: 2000,
            ransac_seed: 0,
            circularity_area_factor: 3.0,
            fast_threshold: 20,
            pyramid_levels: 8,
            pyramid_scale_factor: 1.2,
        }
    }
}

/// Largest structuring element edge accepted by the noise filter
pub const MAX_KERNEL_SIZE: u32 = 255;

fn check_non_negative(key: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value, "a finite value >= 0"))
    }
}

fn check_unit_interval(key: &'static str, value: f64) -> ConfigResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value, "in (0, 1]"))
    }
}

fn check_kernel(key: &'static str, value: u32) -> ConfigResult<()> {
    if (1..=MAX_KERNEL_SIZE).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value, "in 1..=255"))
    }
}

impl DetectionConfig {
    /// Start a fluent builder from the defaults
    pub fn builder() -> DetectionConfigBuilder {
        DetectionConfigBuilder::new()
    }

    /// Convert to a builder for further customization
    pub fn to_builder(self) -> DetectionConfigBuilder {
        DetectionConfigBuilder::from_config(self)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ConfigResult<()> {
        if self.orb_max_features == 0 {
            return Err(ConfigError::out_of_range("ORB_MAX_FEATURES", self.orb_max_features, ">= 1"));
        }
        check_unit_interval("ORB_KEEP_PERCENT", self.orb_keep_percent)?;
        check_non_negative("DELTA_E_PIXEL_THRESHOLD", self.delta_e_pixel_threshold)?;
        check_non_negative("MEAN_DIFF", self.mean_diff)?;
        check_non_negative("MAX_DIFF", self.max_diff)?;
        check_non_negative("AREA_PERCENT", self.area_percent)?;
        check_non_negative("MIN_DEFECT_SIZE", self.min_defect_size)?;
        check_non_negative("MIN_CIRCULARITY", self.min_circularity)?;
        check_kernel("MORPH_OPEN_KERNEL_SIZE", self.morph_open_kernel_size)?;
        check_kernel("MORPH_CLOSE_KERNEL_SIZE", self.morph_close_kernel_size)?;
        check_unit_interval("RATIO_TEST", self.ratio_test)?;
        if self.fallback_min_matches < 4 {
            return Err(ConfigError::out_of_range(
                "FALLBACK_MIN_MATCHES",
                self.fallback_min_matches,
                ">= 4",
            ));
        }
        if !(self.ransac_reproj_threshold.is_finite() && self.ransac_reproj_threshold > 0.0) {
            return Err(ConfigError::out_of_range(
                "RANSAC_REPROJ_THRESHOLD",
                self.ransac_reproj_threshold,
                "a finite value > 0",
            ));
        }
        if self.ransac_max_iterations == 0 {
            return Err(ConfigError::out_of_range("RANSAC_MAX_ITERATIONS", self.ransac_max_iterations, ">= 1"));
        }
        if !(self.circularity_area_factor.is_finite() && self.circularity_area_factor >= 1.0) {
            return Err(ConfigError::out_of_range(
                "CIRCULARITY_AREA_FACTOR",
                self.circularity_area_factor,
                "a finite value >= 1",
            ));
        }
        // 0 would flag every pixel, >127 overflows the u8 comparisons
        if self.fast_threshold == 0 || self.fast_threshold > 127 {
            return Err(ConfigError::out_of_range("FAST_THRESHOLD", self.fast_threshold, "in 1..=127"));
        }
        if !(1..=16).contains(&self.pyramid_levels) {
            return Err(ConfigError::out_of_range("PYRAMID_LEVELS", self.pyramid_levels, "in 1..=16"));
        }
        if !(self.pyramid_scale_factor.is_finite() && self.pyramid_scale_factor > 1.0) {
            return Err(ConfigError::out_of_range(
                "PYRAMID_SCALE_FACTOR",
                self.pyramid_scale_factor,
                "a finite value > 1",
            ));
        }
        Ok(())
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "DetectionConfig: features={}, keep={:.2}, ratio={:.2}, ransac={:.1}px, \
             ΔE[pixel={:.1}, mean={:.1}, max={:.1}, area={:.1}%], \
             noise[min_size={:.0}, circ={:.2}, open={}x{}, close={}x{}]",
            self.orb_max_features,
            self.orb_keep_percent,
            self.ratio_test,
            self.ransac_reproj_threshold,
            self.delta_e_pixel_threshold,
            self.mean_diff,
            self.max_diff,
            self.area_percent,
            self.min_defect_size,
            self.min_circularity,
            self.morph_open_kernel_size,
            self.morph_open_iterations,
            self.morph_close_kernel_size,
            self.morph_close_iterations,
        )
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> ConfigResult<()> {
        let json = self.to_json()?;
        write_file(path.as_ref(), &json)
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> ConfigResult<()> {
        let toml = self.to_toml()?;
        write_file(path.as_ref(), &toml)
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        Self::from_toml(&read_file(path.as_ref())?)
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "serde")]
fn read_file(path: &std::path::Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(feature = "serde")]
fn write_file(path: &std::path::Path, contents: &str) -> ConfigResult<()> {
    std::fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Fluent API builder for [`DetectionConfig`]
#[derive(Debug, Clone, Default)]
pub struct DetectionConfigBuilder {
    config: DetectionConfig,
}

impl DetectionConfigBuilder {
    /// Create new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create builder from existing configuration
    pub fn from_config(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Set the keypoint cap per image
    pub fn max_features(mut self, max_features: usize) -> Self {
        self.config.orb_max_features = max_features;
        self
    }

    /// Set the fallback match-retention fraction
    pub fn keep_percent(mut self, keep_percent: f64) -> Self {
        self.config.orb_keep_percent = keep_percent;
        self
    }

    /// Set the per-pixel ΔE cutoff
    pub fn pixel_threshold(mut self, threshold: f64) -> Self {
        self.config.delta_e_pixel_threshold = threshold;
        self
    }

    /// Set the three classifier limits at once
    pub fn limits(mut self, mean_diff: f64, max_diff: f64, area_percent: f64) -> Self {
        self.config.mean_diff = mean_diff;
        self.config.max_diff = max_diff;
        self.config.area_percent = area_percent;
        self
    }

    /// Set minimum defect area in square pixels
    pub fn min_defect_size(mut self, min_size: f64) -> Self {
        self.config.min_defect_size = min_size;
        self
    }

    /// Set the circularity floor for small contours
    pub fn min_circularity(mut self, min_circularity: f64) -> Self {
        self.config.min_circularity = min_circularity;
        self
    }

    /// Set opening element size and repeat count
    pub fn opening(mut self, kernel_size: u32, iterations: u32) -> Self {
        self.config.morph_open_kernel_size = kernel_size;
        self.config.morph_open_iterations = iterations;
        self
    }

    /// Set closing element size and repeat count
    pub fn closing(mut self, kernel_size: u32, iterations: u32) -> Self {
        self.config.morph_close_kernel_size = kernel_size;
        self.config.morph_close_iterations = iterations;
        self
    }

    /// Set the Lowe ratio
    pub fn ratio_test(mut self, ratio: f64) -> Self {
        self.config.ratio_test = ratio;
        self
    }

    /// Set the fallback trigger / floor
    pub fn fallback_min_matches(mut self, min_matches: usize) -> Self {
        self.config.fallback_min_matches = min_matches;
        self
    }

    /// Set RANSAC inlier threshold and iteration budget
    pub fn ransac(mut self, reproj_threshold: f64, max_iterations: usize) -> Self {
        self.config.ransac_reproj_threshold = reproj_threshold;
        self.config.ransac_max_iterations = max_iterations;
        self
    }

    /// Set RANSAC RNG seed
    pub fn ransac_seed(mut self, seed: u64) -> Self {
        self.config.ransac_seed = seed;
        self
    }

    /// Set the circularity band factor
    pub fn circularity_area_factor(mut self, factor: f64) -> Self {
        self.config.circularity_area_factor = factor;
        self
    }

    /// Set FAST threshold (1-127)
    pub fn fast_threshold(mut self, threshold: u8) -> Self {
        self.config.fast_threshold = threshold;
        self
    }

    /// Set pyramid depth and ratio
    pub fn pyramid(mut self, levels: usize, scale_factor: f32) -> Self {
        self.config.pyramid_levels = levels;
        self.config.pyramid_scale_factor = scale_factor;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ConfigResult<DetectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Generate summary of current configuration
    pub fn summary(&self) -> String {
        self.config.summary()
    }
}
