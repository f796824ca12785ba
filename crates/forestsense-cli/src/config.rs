//! Simulator configuration – reads `~/.forestsense/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use forestsense_perception::FieldParams;
use forestsense_runtime::SensingLoopConfig;
use forestsense_types::SenseError;
use serde::{Deserialize, Serialize};

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "FORESTSENSE_CONFIG";

/// Rectangle the pillars are placed in (metres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapBoundary {
    #[serde(default)]
    pub lower_x: f64,
    #[serde(default = "default_upper")]
    pub upper_x: f64,
    #[serde(default)]
    pub lower_y: f64,
    #[serde(default = "default_upper")]
    pub upper_y: f64,
}

impl Default for MapBoundary {
    fn default() -> Self {
        Self {
            lower_x: 0.0,
            upper_x: default_upper(),
            lower_y: 0.0,
            upper_y: default_upper(),
        }
    }
}

/// Pillar width and height ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleShape {
    #[serde(default = "default_lower_rad")]
    pub lower_rad: f64,
    #[serde(default = "default_upper_rad")]
    pub upper_rad: f64,
    #[serde(default = "default_lower_hei")]
    pub lower_hei: f64,
    #[serde(default = "default_upper_hei")]
    pub upper_hei: f64,
    /// Read for compatibility with existing config files; generation does
    /// not cap heights with it.
    #[serde(default = "default_z_limit")]
    pub z_limit: f64,
}

impl Default for ObstacleShape {
    fn default() -> Self {
        Self {
            lower_rad: default_lower_rad(),
            upper_rad: default_upper_rad(),
            lower_hei: default_lower_hei(),
            upper_hei: default_upper_hei(),
            z_limit: default_z_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBoundary {
    /// Sensing radius around the observer (metres).
    #[serde(default = "default_radius")]
    pub radius: f32,
}

impl Default for LocalBoundary {
    fn default() -> Self {
        Self { radius: default_radius() }
    }
}

/// Persisted simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub map_boundary: MapBoundary,

    #[serde(default)]
    pub obstacle_shape: ObstacleShape,

    #[serde(default)]
    pub local_boundary: LocalBoundary,

    /// Number of pillars to draw.
    #[serde(default = "default_obstacle_num")]
    pub obstacle_num: usize,

    /// Lattice spacing (metres).
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Sensing loop frequency (Hz).
    #[serde(default = "default_sensing_rate")]
    pub sensing_rate: f64,

    /// Number of leading ticks that also publish the full field.
    #[serde(default = "default_global_map_ticks")]
    pub global_map_ticks: u64,

    /// Fixed RNG seed; a fresh one is drawn and logged when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Odometry origin labels that never update the observer.
    #[serde(default = "default_excluded_frames")]
    pub excluded_frames: Vec<String>,

    /// WebSocket bridge port.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
}

fn default_upper() -> f64 {
    100.0
}
fn default_lower_rad() -> f64 {
    0.3
}
fn default_upper_rad() -> f64 {
    0.8
}
fn default_lower_hei() -> f64 {
    3.0
}
fn default_upper_hei() -> f64 {
    7.0
}
fn default_z_limit() -> f64 {
    5.0
}
fn default_radius() -> f32 {
    10.0
}
fn default_obstacle_num() -> usize {
    30
}
fn default_resolution() -> f64 {
    0.2
}
fn default_sensing_rate() -> f64 {
    10.0
}
fn default_global_map_ticks() -> u64 {
    100
}
fn default_excluded_frames() -> Vec<String> {
    vec!["X".to_string(), "O".to_string()]
}
fn default_bridge_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_boundary: MapBoundary::default(),
            obstacle_shape: ObstacleShape::default(),
            local_boundary: LocalBoundary::default(),
            obstacle_num: default_obstacle_num(),
            resolution: default_resolution(),
            sensing_rate: default_sensing_rate(),
            global_map_ticks: default_global_map_ticks(),
            seed: None,
            excluded_frames: default_excluded_frames(),
            bridge_port: default_bridge_port(),
        }
    }
}

impl Config {
    /// Reject configurations the generator or loop cannot run with.
    pub fn validate(&self) -> Result<(), SenseError> {
        let b = &self.map_boundary;
        check_range("map_boundary x", b.lower_x, b.upper_x)?;
        check_range("map_boundary y", b.lower_y, b.upper_y)?;
        let s = &self.obstacle_shape;
        check_range("obstacle_shape rad", s.lower_rad, s.upper_rad)?;
        check_range("obstacle_shape hei", s.lower_hei, s.upper_hei)?;
        check_positive("resolution", self.resolution)?;
        check_positive("sensing_rate", self.sensing_rate)?;
        check_positive("local_boundary.radius", f64::from(self.local_boundary.radius))?;
        Ok(())
    }

    /// Generator parameters for this configuration.
    pub fn to_field_params(&self) -> FieldParams {
        FieldParams {
            lower_x: self.map_boundary.lower_x,
            upper_x: self.map_boundary.upper_x,
            lower_y: self.map_boundary.lower_y,
            upper_y: self.map_boundary.upper_y,
            lower_rad: self.obstacle_shape.lower_rad,
            upper_rad: self.obstacle_shape.upper_rad,
            lower_hei: self.obstacle_shape.lower_hei,
            upper_hei: self.obstacle_shape.upper_hei,
            obstacle_num: self.obstacle_num,
            resolution: self.resolution,
        }
    }

    /// Sensing loop settings for this configuration.
    pub fn to_loop_config(&self) -> SensingLoopConfig {
        SensingLoopConfig {
            sensing_radius: self.local_boundary.radius,
            sensing_rate_hz: self.sensing_rate,
            global_map_ticks: self.global_map_ticks,
        }
    }
}

fn check_range(name: &str, lower: f64, upper: f64) -> Result<(), SenseError> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(SenseError::Config(format!("{name} bounds must be finite")));
    }
    if lower > upper {
        return Err(SenseError::Config(format!(
            "{name} lower bound {lower} exceeds upper bound {upper}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), SenseError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SenseError::Config(format!("{name} must be positive, got {value}")))
    }
}

/// Return the config path: `$FORESTSENSE_CONFIG` if set, otherwise
/// `~/.forestsense/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".forestsense").join("config.toml")
}

/// Load the config from [`config_path`]. A missing file yields defaults.
pub fn load() -> Result<Config, SenseError> {
    load_from(&config_path())
}

/// Load the config from a specific path, then apply env overrides.
pub(crate) fn load_from(path: &Path) -> Result<Config, SenseError> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|e| {
            SenseError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| SenseError::Config(format!("failed to parse {}: {e}", path.display())))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `FORESTSENSE_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `FORESTSENSE_SEED` | `seed` |
/// | `FORESTSENSE_OBSTACLE_NUM` | `obstacle_num` |
/// | `FORESTSENSE_SENSING_RATE` | `sensing_rate` |
/// | `FORESTSENSE_SENSING_RADIUS` | `local_boundary.radius` |
/// | `FORESTSENSE_BRIDGE_PORT` | `bridge_port` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(seed) = env_parse::<u64>("FORESTSENSE_SEED") {
        cfg.seed = Some(seed);
    }
    if let Some(n) = env_parse::<usize>("FORESTSENSE_OBSTACLE_NUM") {
        cfg.obstacle_num = n;
    }
    if let Some(rate) = env_parse::<f64>("FORESTSENSE_SENSING_RATE") {
        cfg.sensing_rate = rate;
    }
    if let Some(radius) = env_parse::<f32>("FORESTSENSE_SENSING_RADIUS") {
        cfg.local_boundary.radius = radius;
    }
    if let Some(port) = env_parse::<u16>("FORESTSENSE_BRIDGE_PORT") {
        cfg.bridge_port = port;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
