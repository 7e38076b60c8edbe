//! Configuration types for the AFM analysis pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Indenter geometry used by the contact models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactModel {
    /// Paraboloid tip, `tip_param` is the radius in metres.
    Paraboloid,
    /// Conical tip, `tip_param` is the half-opening angle in degrees.
    Cone,
    /// Four-sided pyramid, `tip_param` is the face angle in degrees.
    Pyramid,
}

/// Which segment the Hertz fit runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveSegment {
    Extend,
    Retract,
}

/// Contact point detection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocMethod {
    /// Ratio of variances of two sliding windows.
    Rov,
    /// Last zero crossing of the baseline-corrected deflection.
    RegulaFalsi,
}

/// Data range the Hertz fit is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitRangeType {
    Full,
    Indentation,
    Force,
}

/// How the baseline offset region is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetType {
    /// `min_offset`/`max_offset` are fractions of the approach height span.
    Percentage,
    /// `min_offset`/`max_offset` are absolute heights in metres from the start.
    Value,
}

/// Batch traversal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Curve analysed in each file.
    #[serde(default)]
    pub curve_index: usize,

    /// File extensions (without the dot) picked up while walking.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_contact_offset() -> f64 {
    1e-6
}

fn default_pts_downsample() -> usize {
    300
}

fn default_extensions() -> Vec<String> {
    vec!["jpk-force-map".to_string()]
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            curve_index: 0,
            extensions: default_extensions(),
        }
    }
}

/// Parameters of the contact point search and the Hertz/Ting fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Deflection sensitivity override in m/V (file metadata otherwise).
    #[serde(default)]
    pub def_sens: Option<f64>,

    /// Spring constant override in N/m (file metadata otherwise).
    #[serde(default)]
    pub k: Option<f64>,

    #[serde(default = "default_contact_model")]
    pub contact_model: ContactModel,

    #[serde(default = "default_tip_param")]
    pub tip_param: f64,

    #[serde(default = "default_curve_seg")]
    pub curve_seg: CurveSegment,

    #[serde(default)]
    pub correct_tilt: bool,

    #[serde(default = "default_tilt_min_offset")]
    pub tilt_min_offset: f64,

    #[serde(default = "default_tilt_max_offset")]
    pub tilt_max_offset: f64,

    #[serde(default = "default_poisson")]
    pub poisson: f64,

    #[serde(default = "default_poc_method")]
    pub poc_method: PocMethod,

    /// Window size for the RoV method in metres.
    #[serde(default = "default_poc_win")]
    pub poc_win: f64,

    #[serde(default)]
    pub max_ind: f64,

    #[serde(default)]
    pub min_ind: f64,

    #[serde(default)]
    pub max_force: f64,

    #[serde(default)]
    pub min_force: f64,

    #[serde(default = "default_fit_range_type")]
    pub fit_range_type: FitRangeType,

    /// Time scale of the power-law relaxation in seconds.
    #[serde(default = "default_t0")]
    pub t0: f64,

    /// Initial contact point offset in metres.
    #[serde(default)]
    pub d0: f64,

    /// Initial baseline slope.
    #[serde(default)]
    pub slope: f64,

    #[serde(default = "default_true")]
    pub auto_init_e0: bool,

    /// Initial Young's modulus in Pa.
    #[serde(default = "default_e0")]
    pub e0: f64,

    /// Initial contact time in seconds.
    #[serde(default)]
    pub tc: f64,

    #[serde(default = "default_true")]
    pub auto_init_beta: bool,

    /// Initial fluidity exponent.
    #[serde(default = "default_fluid_exp")]
    pub fluid_exp: f64,

    /// Initial force offset in N.
    #[serde(default)]
    pub f0: f64,

    /// Viscous drag coefficient in N*s/m.
    #[serde(default = "default_vdrag")]
    pub vdrag: f64,

    #[serde(default = "default_smoothing_win")]
    pub smoothing_win: usize,

    /// Baseline kept before contact in metres, for the Hertz fit and the
    /// contact frame shared by the Ting fit and the hysteresis analysis.
    #[serde(default = "default_contact_offset")]
    pub contact_offset: f64,

    #[serde(default)]
    pub fit_line: bool,

    #[serde(default = "default_true")]
    pub downsample_flag: bool,

    /// Target number of points after downsampling, for the fits and the
    /// hysteresis analysis.
    #[serde(default = "default_pts_downsample")]
    pub pts_downsample: usize,

    #[serde(default = "default_offset_type")]
    pub offset_type: OffsetType,

    #[serde(default = "default_max_offset")]
    pub max_offset: f64,

    #[serde(default)]
    pub min_offset: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_contact_model() -> ContactModel {
    ContactModel::Paraboloid
}

fn default_tip_param() -> f64 {
    5e-6
}

fn default_curve_seg() -> CurveSegment {
    CurveSegment::Extend
}

fn default_tilt_min_offset() -> f64 {
    1e-8
}

fn default_tilt_max_offset() -> f64 {
    1e-6
}

fn default_poisson() -> f64 {
    0.5
}

fn default_poc_method() -> PocMethod {
    PocMethod::Rov
}

fn default_poc_win() -> f64 {
    4e-7
}

fn default_fit_range_type() -> FitRangeType {
    FitRangeType::Full
}

fn default_t0() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_e0() -> f64 {
    1000.0
}

fn default_fluid_exp() -> f64 {
    0.2
}

fn default_vdrag() -> f64 {
    2.5e-6
}

fn default_smoothing_win() -> usize {
    5
}

fn default_offset_type() -> OffsetType {
    OffsetType::Percentage
}

fn default_max_offset() -> f64 {
    0.3
}

fn default_max_iterations() -> usize {
    200
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            def_sens: None,
            k: None,
            contact_model: default_contact_model(),
            tip_param: default_tip_param(),
            curve_seg: default_curve_seg(),
            correct_tilt: false,
            tilt_min_offset: default_tilt_min_offset(),
            tilt_max_offset: default_tilt_max_offset(),
            poisson: default_poisson(),
            poc_method: default_poc_method(),
            poc_win: default_poc_win(),
            max_ind: 0.0,
            min_ind: 0.0,
            max_force: 0.0,
            min_force: 0.0,
            fit_range_type: default_fit_range_type(),
            t0: default_t0(),
            d0: 0.0,
            slope: 0.0,
            auto_init_e0: true,
            e0: default_e0(),
            tc: 0.0,
            auto_init_beta: true,
            fluid_exp: default_fluid_exp(),
            f0: 0.0,
            vdrag: default_vdrag(),
            smoothing_win: default_smoothing_win(),
            contact_offset: default_contact_offset(),
            fit_line: false,
            downsample_flag: true,
            pts_downsample: default_pts_downsample(),
            offset_type: default_offset_type(),
            max_offset: default_max_offset(),
            min_offset: 0.0,
            max_iterations: default_max_iterations(),
        }
    }
}

/// Output file names and plot options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_summary_file_name")]
    pub summary_file_name: String,

    #[serde(default = "default_combined_plot_name")]
    pub combined_plot_name: String,

    #[serde(default = "default_plot_width")]
    pub plot_width: u32,

    #[serde(default = "default_plot_height")]
    pub plot_height: u32,

    /// Write `<file>.png` next to every analysed file.
    #[serde(default = "default_true")]
    pub curve_plots: bool,

    /// Write the combined plot in every folder with curves.
    #[serde(default = "default_true")]
    pub folder_plots: bool,

    /// Write `<file>.csv` with the plotted indentation/force pairs.
    #[serde(default)]
    pub curve_csv: bool,
}

fn default_summary_file_name() -> String {
    "summary.csv".to_string()
}

fn default_combined_plot_name() -> String {
    "combined_plot.png".to_string()
}

fn default_plot_width() -> u32 {
    1000
}

fn default_plot_height() -> u32 {
    500
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_file_name: default_summary_file_name(),
            combined_plot_name: default_combined_plot_name(),
            plot_width: default_plot_width(),
            plot_height: default_plot_height(),
            curve_plots: true,
            folder_plots: true,
            curve_csv: false,
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub fit: FitConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject parameter combinations the analysis cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.fit.pts_downsample == 0 {
            return Err("pts_downsample must be at least 1".to_string());
        }
        if !(0.0..=0.5).contains(&self.fit.poisson) {
            return Err(format!("poisson ratio {} outside [0, 0.5]", self.fit.poisson));
        }
        if self.fit.tip_param <= 0.0 {
            return Err(format!("tip_param must be positive, got {}", self.fit.tip_param));
        }
        if self.fit.max_offset <= self.fit.min_offset {
            return Err(format!(
                "max_offset ({}) must exceed min_offset ({})",
                self.fit.max_offset, self.fit.min_offset
            ));
        }
        if self.fit.t0 <= 0.0 {
            return Err("t0 must be positive".to_string());
        }
        Ok(())
    }
}
