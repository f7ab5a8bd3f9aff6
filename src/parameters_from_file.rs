//! Supports reading the controller configuration from YAML file (optional)

use std::path::Path;
use std::time::Duration;
use yaml_rust2::{Yaml, YamlLoader};

use crate::parameter_error::ParameterError;
use crate::parameters::{ControlConfig, ControllerParameters, LoopParameters};

const SECTION: &str = "cartesian_control";

impl ControlConfig {
    /// Read the configuration from YAML file. YAML file like this is supported:
    /// ```yaml
    /// cartesian_control:
    ///   gain: 1.0
    ///   damping: 0.01
    ///   max_joint_velocity: 1.5
    ///   redundancy_gain: 0.5
    ///   pseudo_inverse_epsilon: 1e-9
    ///   period_ms: 100
    ///   command_freshness_ms: 500
    ///   redundancy_freshness_ms: 500
    ///   redundant_joint: shoulder_pan
    ///   end_effector: tool0
    /// ```
    /// All keys are optional and take the defaults when missing.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ParameterError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|e| ParameterError::ParseError(format!("{}", e)))?;
        let doc = docs.first()
            .ok_or_else(|| ParameterError::MissingField(SECTION.to_string()))?;
        let section = &doc[SECTION];
        if section.is_badvalue() {
            return Err(ParameterError::MissingField(SECTION.to_string()));
        }
        if !matches!(section, Yaml::Hash(_)) {
            return Err(ParameterError::ParseError(format!("{} must be a mapping", SECTION)));
        }

        let defaults = ControllerParameters::default();
        let controller = ControllerParameters {
            gain: non_negative(section, "gain", defaults.gain)?,
            damping: positive(section, "damping", defaults.damping)?,
            max_joint_velocity: positive(section, "max_joint_velocity", defaults.max_joint_velocity)?,
            redundancy_gain: non_negative(section, "redundancy_gain", defaults.redundancy_gain)?,
            pseudo_inverse_epsilon: positive(section, "pseudo_inverse_epsilon", defaults.pseudo_inverse_epsilon)?,
        };

        let defaults = LoopParameters::default();
        let control_loop = LoopParameters {
            period: millis(section, "period_ms", defaults.period)?,
            command_freshness: millis(section, "command_freshness_ms", defaults.command_freshness)?,
            redundancy_freshness: millis(section, "redundancy_freshness_ms", defaults.redundancy_freshness)?,
            redundant_joint: text(section, "redundant_joint")?,
        };

        Ok(ControlConfig {
            controller,
            control_loop,
            end_effector: text(section, "end_effector")?,
        })
    }
}

/// Numeric value; integers are accepted where reals are expected.
fn real(section: &Yaml, key: &str, default: f64) -> Result<f64, ParameterError> {
    let value = &section[key];
    let parsed = match value {
        Yaml::BadValue | Yaml::Null => return Ok(default),
        Yaml::Integer(i) => *i as f64,
        Yaml::Real(_) => value.as_f64().ok_or_else(||
            ParameterError::ParseError(format!("{} is not a number", key)))?,
        _ => return Err(ParameterError::ParseError(format!("{} must be a number", key))),
    };
    if !parsed.is_finite() {
        return Err(ParameterError::InvalidValue(format!("{} must be finite (got {})", key, parsed)));
    }
    Ok(parsed)
}

fn positive(section: &Yaml, key: &str, default: f64) -> Result<f64, ParameterError> {
    let value = real(section, key, default)?;
    if value <= 0.0 {
        return Err(ParameterError::InvalidValue(format!("{} must be positive (got {})", key, value)));
    }
    Ok(value)
}

fn non_negative(section: &Yaml, key: &str, default: f64) -> Result<f64, ParameterError> {
    let value = real(section, key, default)?;
    if value < 0.0 {
        return Err(ParameterError::InvalidValue(format!("{} must not be negative (got {})", key, value)));
    }
    Ok(value)
}

fn millis(section: &Yaml, key: &str, default: Duration) -> Result<Duration, ParameterError> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(default),
        Yaml::Integer(ms) if *ms > 0 => Ok(Duration::from_millis(*ms as u64)),
        Yaml::Integer(ms) =>
            Err(ParameterError::InvalidValue(format!("{} must be positive (got {})", key, ms))),
        _ => Err(ParameterError::ParseError(format!("{} must be an integer number of milliseconds", key))),
    }
}

fn text(section: &Yaml, key: &str) -> Result<Option<String>, ParameterError> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::String(s) => Ok(Some(s.clone())),
        _ => Err(ParameterError::ParseError(format!("{} must be a string", key))),
    }
}
