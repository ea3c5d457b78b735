use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub spine: SpineConfig,
    #[serde(default)]
    pub smooth: SmoothConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub exercises: Vec<ExerciseEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Detections below this confidence are treated as absent
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Minimum seconds between two counted reps
    #[serde(default = "default_count_cooldown_secs")]
    pub count_cooldown_secs: f32,
    /// Seconds of missing readiness points before the hint is shown
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: f32,
    /// Priority for conditions that do not declare one (lower wins)
    #[serde(default = "default_priority")]
    pub default_priority: u32,
}

fn default_confidence_threshold() -> f32 { 0.5 }
fn default_count_cooldown_secs() -> f32 { 0.3 }
fn default_readiness_timeout_secs() -> f32 { 2.0 }
fn default_priority() -> u32 { 99 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            count_cooldown_secs: default_count_cooldown_secs(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
            default_priority: default_priority(),
        }
    }
}

/// Spine curvature estimator tuning
#[derive(Debug, Deserialize, Clone)]
pub struct SpineConfig {
    /// Torso inclination (deg) above which the torso counts as hinged
    #[serde(default = "default_hinge_angle_deg")]
    pub hinge_angle_deg: f32,
    /// Compression allowance at 90° inclination, scaled linearly below it
    #[serde(default = "default_hinge_tolerance_gain")]
    pub hinge_tolerance_gain: f32,
    /// Constant allowance for camera pitch while near upright
    #[serde(default = "default_camera_pitch_tolerance")]
    pub camera_pitch_tolerance: f32,
    /// Inclination (deg) below which the camera pitch allowance applies
    #[serde(default = "default_pitch_tolerance_max_deg")]
    pub pitch_tolerance_max_deg: f32,
    #[serde(default = "default_rounding_gain")]
    pub rounding_gain: f32,
    #[serde(default = "default_extension_gain")]
    pub extension_gain: f32,
    #[serde(default = "default_lateral_gain")]
    pub lateral_gain: f32,
    /// Effective compression above which a hinged torso is flagged as rounded
    #[serde(default = "default_rounding_threshold")]
    pub rounding_threshold: f32,
    #[serde(default = "default_thorax_location")]
    pub thorax_location: f32,
    #[serde(default = "default_lumbar_location")]
    pub lumbar_location: f32,
    /// Lumbar sagittal displacement relative to the thorax point
    #[serde(default = "default_lumbar_sagittal_factor")]
    pub lumbar_sagittal_factor: f32,
    /// -1: subject faces left, 1: subject faces right
    #[serde(default = "default_direction_flip")]
    pub direction_flip: f32,
    #[serde(default = "default_baseline_decay")]
    pub baseline_decay: f32,
    #[serde(default = "default_baseline_damping")]
    pub baseline_damping: f32,
}

fn default_hinge_angle_deg() -> f32 { 15.0 }
fn default_hinge_tolerance_gain() -> f32 { 0.5 }
fn default_camera_pitch_tolerance() -> f32 { 0.08 }
fn default_pitch_tolerance_max_deg() -> f32 { 30.0 }
fn default_rounding_gain() -> f32 { 8.0 }
fn default_extension_gain() -> f32 { 0.5 }
fn default_lateral_gain() -> f32 { 0.5 }
fn default_rounding_threshold() -> f32 { 0.06 }
fn default_thorax_location() -> f32 { 0.33 }
fn default_lumbar_location() -> f32 { 0.66 }
fn default_lumbar_sagittal_factor() -> f32 { 1.5 }
fn default_direction_flip() -> f32 { -1.0 }
fn default_baseline_decay() -> f32 { 0.9995 }
fn default_baseline_damping() -> f32 { 0.05 }

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            hinge_angle_deg: default_hinge_angle_deg(),
            hinge_tolerance_gain: default_hinge_tolerance_gain(),
            camera_pitch_tolerance: default_camera_pitch_tolerance(),
            pitch_tolerance_max_deg: default_pitch_tolerance_max_deg(),
            rounding_gain: default_rounding_gain(),
            extension_gain: default_extension_gain(),
            lateral_gain: default_lateral_gain(),
            rounding_threshold: default_rounding_threshold(),
            thorax_location: default_thorax_location(),
            lumbar_location: default_lumbar_location(),
            lumbar_sagittal_factor: default_lumbar_sagittal_factor(),
            direction_flip: default_direction_flip(),
            baseline_decay: default_baseline_decay(),
            baseline_damping: default_baseline_damping(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    #[serde(default = "default_smooth_enabled")]
    pub enabled: bool,
    #[serde(default = "default_min_alpha")]
    pub min_alpha: f32,
    #[serde(default = "default_max_alpha")]
    pub max_alpha: f32,
    /// Displacement (px) at which the smoother reaches `max_alpha`
    #[serde(default = "default_distance_scale")]
    pub distance_scale: f32,
}

fn default_smooth_enabled() -> bool { true }
fn default_min_alpha() -> f32 { 0.3 }
fn default_max_alpha() -> f32 { 0.95 }
fn default_distance_scale() -> f32 { 10.0 }

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            enabled: default_smooth_enabled(),
            min_alpha: default_min_alpha(),
            max_alpha: default_max_alpha(),
            distance_scale: default_distance_scale(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    /// Rep verdicts remembered per condition
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Consecutive bad reps before a condition may take the lock
    #[serde(default = "default_debounce")]
    pub debounce: usize,
    #[serde(default = "default_success_message")]
    pub success_message: String,
    #[serde(default = "default_success_message_secs")]
    pub success_message_secs: f32,
    #[serde(default = "default_message_priority")]
    pub message_priority: u8,
}

fn default_history_len() -> usize { 5 }
fn default_debounce() -> usize { 2 }
fn default_success_message() -> String { "Perfect rep!".to_string() }
fn default_success_message_secs() -> f32 { 1.5 }
fn default_message_priority() -> u8 { 2 }

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
            debounce: default_debounce(),
            success_message: default_success_message(),
            success_message_secs: default_success_message_secs(),
            message_priority: default_message_priority(),
        }
    }
}

/// A selectable exercise and the document describing it
#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseEntry {
    pub name: String,
    pub path: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Resolve exercise document paths relative to the config file's directory
    pub fn resolve_paths<P: AsRef<Path>>(mut self, config_path: P) -> Self {
        if let Some(dir) = config_path.as_ref().parent() {
            for entry in &mut self.exercises {
                if entry.path.is_relative() {
                    entry.path = dir.join(&entry.path);
                }
            }
        }
        self
    }
}
