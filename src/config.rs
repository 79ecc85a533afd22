//! Agent configuration.
//!
//! Everything has a default equal to the calibrated constants, so a missing
//! section (or an empty file) yields the stock agent. Unknown keys are ignored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::field::DEFAULT_GOAL_LINE;
use crate::perception::planner::DEFAULT_CHANNELS;

/// Top-level config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub policy: PolicyParams,
    #[serde(default)]
    pub team: TeamConfig,
}

/// Where the perception weights live and what shape they have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `.npz` (native) or `.onnx` file. Relative paths resolve against the
    /// directory of the config file.
    pub path: PathBuf,
    /// Output width of each backbone block.
    pub channels: Vec<usize>,
}

impl ModelConfig {
    /// Rewrite a relative `path` to live under `base_dir`. Absolute paths are kept.
    pub fn resolve_against<P: AsRef<Path>>(&mut self, base_dir: P) {
        if self.path.is_relative() {
            self.path = base_dir.as_ref().join(&self.path);
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("planner.npz"),
            channels: DEFAULT_CHANNELS.to_vec(),
        }
    }
}

/// Striker controller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    /// Baseline steer is `steer_gain² · x`.
    pub steer_gain: f32,
    /// Throttle is cut once ground speed reaches this.
    pub target_velocity: f32,
    /// Visibility scores below this mean the puck is not on screen.
    pub visibility_threshold: f32,
    /// Position/speed change below which the kart is considered stuck.
    pub stuck_epsilon: f32,
    /// `|x|` below this counts as straight ahead.
    pub centered_x: f32,
    /// Vertical calibration offset: the puck is centered when `|y + offset| < band`.
    pub centered_y_offset: f32,
    pub centered_y_band: f32,
    /// Distance proxy at or below this means the puck is right next to the kart.
    pub close_distance: f32,
    /// Location `y` must stay above this for the off-side maneuver.
    pub behind_y: f32,
    /// Fine alignment applies for `alignment_min <= distance < alignment_max`.
    pub alignment_min: f32,
    pub alignment_max: f32,
    pub alignment_increment: f32,
    /// Throttle while searching from our own half.
    pub search_acceleration: f32,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            steer_gain: 2.25,
            target_velocity: 25.0,
            visibility_threshold: 6.1,
            stuck_epsilon: 1e-4,
            centered_x: 0.02,
            centered_y_offset: 0.025,
            centered_y_band: 0.05,
            close_distance: 0.02,
            behind_y: -0.075,
            alignment_min: 0.05,
            alignment_max: 0.1,
            alignment_increment: 0.4,
            search_acceleration: 0.5,
        }
    }
}

/// Roster and rink settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Kart model requested for every player.
    pub kart: String,
    /// Distance from center to each goal line.
    pub goal_line: f32,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            kart: "tux".to_string(),
            goal_line: DEFAULT_GOAL_LINE,
        }
    }
}

/// Load an `AgentConfig` from a YAML file.
///
/// A relative `model.path` is rewritten relative to the config file's directory.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AgentConfig> {
    let contents = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
    let mut config: AgentConfig = if contents.trim().is_empty() {
        AgentConfig::default()
    } else {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?
    };

    if let Some(dir) = path.as_ref().parent() {
        config.model.resolve_against(dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
model:
  path: /models/planner.onnx
  channels: [8, 16]
policy:
  steer_gain: 2.0
  visibility_threshold: 5.5
team:
  kart: konqi
  goal_line: 60.0
extra_section:
  ignored: true
"#;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(f.path()).unwrap();
        assert_eq!(config.model.path, PathBuf::from("/models/planner.onnx"));
        assert_eq!(config.model.channels, vec![8, 16]);
        assert_eq!(config.policy.steer_gain, 2.0);
        assert_eq!(config.policy.visibility_threshold, 5.5);
        // Unspecified policy fields keep their defaults
        assert_eq!(config.policy.target_velocity, 25.0);
        assert_eq!(config.team.kart, "konqi");
        assert_eq!(config.team.goal_line, 60.0);
    }

    #[test]
    fn test_empty_config_is_default() {
        let f = NamedTempFile::new().unwrap();
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.policy, PolicyParams::default());
        assert_eq!(config.team, TeamConfig::default());
        assert_eq!(config.model.channels, DEFAULT_CHANNELS.to_vec());
    }

    #[test]
    fn test_relative_model_path_follows_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.yaml");
        fs::write(&path, "model:\n  path: weights/planner.npz\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model.path, dir.path().join("weights/planner.npz"));
    }

    #[test]
    fn test_resolve_against_keeps_absolute_paths() {
        let mut model = ModelConfig::default();
        model.resolve_against("/opt/agent");
        assert_eq!(model.path, PathBuf::from("/opt/agent/planner.npz"));

        let mut model = ModelConfig {
            path: PathBuf::from("/models/planner.onnx"),
            ..ModelConfig::default()
        };
        model.resolve_against("/opt/agent");
        assert_eq!(model.path, PathBuf::from("/models/planner.onnx"));
    }

    #[test]
    fn test_load_config_bad_type_fails() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"policy:\n  steer_gain: fast\n").unwrap();
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        assert!(load_config("/nonexistent/agent.yaml").is_err());
    }
}
