//! Printer configuration.
//!
//! Unlike the teacher's `printer.cfg`/`configparser` INI loader, this
//! crate has no gcode dialect to stay compatible with, so configuration
//! is a plain `serde`-derived TOML document: per-stepper solver tuning
//! (`step_dist`, `active_flags`, `gen_steps_pre_active`/
//! `gen_steps_post_active`) and per-stepper `stepcompress` tuning
//! (`max_error`, `invert_sdir`) from spec.md §6's "Configuration
//! options", plus the planner and MCU clock settings needed to drive
//! them end to end.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepperKind {
    CartesianX,
    CartesianY,
    CartesianZ,
    CoreXYA,
    CoreXYB,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepperConfig {
    pub name: String,
    pub oid: u32,
    pub kind: StepperKind,
    pub step_dist: f64,
    #[serde(default)]
    pub gen_steps_pre_active: f64,
    #[serde(default)]
    pub gen_steps_post_active: f64,
    pub max_error: u32,
    #[serde(default)]
    pub invert_sdir: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtruderConfig {
    pub oid: u32,
    pub step_dist: f64,
    #[serde(default)]
    pub pressure_advance: f64,
    #[serde(default)]
    pub smooth_time: f64,
    pub max_error: u32,
    #[serde(default)]
    pub invert_sdir: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    #[default]
    Trapezoidal,
    Jerk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub kind: PlannerKind,
    pub speed: f64,
    pub accel: f64,
    #[serde(default)]
    pub accel_to_decel: f64,
    #[serde(default = "default_jerk")]
    pub jerk: f64,
    #[serde(default)]
    pub junction_deviation: f64,
    #[serde(default)]
    pub extruder_instant_v: f64,
}

fn default_jerk() -> f64 {
    100_000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct McuConfig {
    /// MCU clock frequency in Hz, used to convert print times to clock ticks.
    pub freq: f64,
}

/// The full motion configuration for one printer.
#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    pub mcu: McuConfig,
    pub planner: PlannerConfig,
    #[serde(default)]
    pub move_queue_capacity: Option<usize>,
    pub steppers: Vec<StepperConfig>,
    #[serde(default)]
    pub extruder: Option<ExtruderConfig>,
}

impl MotionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read configuration file: {:?}", path))?;
        let config: MotionConfig = toml::from_str(&text).with_context(|| format!("failed to parse configuration file: {:?}", path))?;
        Ok(config)
    }

    pub fn move_queue_capacity(&self) -> usize {
        self.move_queue_capacity.unwrap_or(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_cartesian_config() {
        let toml = r#"
            [mcu]
            freq = 16000000.0

            [planner]
            speed = 100.0
            accel = 3000.0
            accel_to_decel = 1500.0
            junction_deviation = 0.05

            [[steppers]]
            name = "x"
            oid = 0
            kind = "cartesian_x"
            step_dist = 0.0125
            max_error = 2
        "#;
        let config: MotionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.steppers.len(), 1);
        assert_eq!(config.steppers[0].oid, 0);
        assert!(config.extruder.is_none());
    }
}
