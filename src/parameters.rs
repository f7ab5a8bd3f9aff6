//! Defines the tunable parameters of the controller and of the control loop

use std::time::Duration;

/// Gains and limits of the differential controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerParameters {
    /// Proportional gain `Kp` applied to the pose error to obtain the desired twist (1/s).
    pub gain: f64,

    /// Damping factor `lambda` of the damped least squares pseudo-inverse. Must be positive.
    pub damping: f64,

    /// Largest joint velocity the controller may command (rad/s). When any joint
    /// exceeds it, the whole velocity vector is scaled down, keeping its direction.
    pub max_joint_velocity: f64,

    /// Proportional gain of the null space (redundancy) objective (1/s).
    pub redundancy_gain: f64,

    /// Singular values below this are treated as zero when computing the null space projector.
    pub pseudo_inverse_epsilon: f64,
}

impl Default for ControllerParameters {
    fn default() -> Self {
        Self {
            gain: 1.0,
            damping: 0.01,
            max_joint_velocity: 1.0,
            redundancy_gain: 1.0,
            pseudo_inverse_epsilon: 1e-9,
        }
    }
}

/// Timing of the periodic control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopParameters {
    /// Period of the control cycle.
    pub period: Duration,

    /// Pose commands older than this are expired.
    pub command_freshness: Duration,

    /// Redundancy commands older than this are expired.
    pub redundancy_freshness: Duration,

    /// Joint the redundancy target applies to. If not set, the first actuated joint.
    pub redundant_joint: Option<String>,
}

impl Default for LoopParameters {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            command_freshness: Duration::from_millis(500),
            redundancy_freshness: Duration::from_millis(500),
            redundant_joint: None,
        }
    }
}

/// Complete configuration, as read from the YAML file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlConfig {
    pub controller: ControllerParameters,
    pub control_loop: LoopParameters,

    /// Link to use as the end effector; if not set, taken from the robot description.
    pub end_effector: Option<String>,
}

impl ControlConfig {
    /// Convert to string yaml representation (quick viewing, etc).
    pub fn to_yaml(&self) -> String {
        let c = &self.controller;
        let l = &self.control_loop;
        let mut yaml = format!(
            "cartesian_control:\n  \
              gain: {}\n  \
              damping: {}\n  \
              max_joint_velocity: {}\n  \
              redundancy_gain: {}\n  \
              pseudo_inverse_epsilon: {:e}\n  \
              period_ms: {}\n  \
              command_freshness_ms: {}\n  \
              redundancy_freshness_ms: {}\n",
            c.gain,
            c.damping,
            c.max_joint_velocity,
            c.redundancy_gain,
            c.pseudo_inverse_epsilon,
            l.period.as_millis(),
            l.command_freshness.as_millis(),
            l.redundancy_freshness.as_millis(),
        );
        if let Some(joint) = &l.redundant_joint {
            yaml.push_str(&format!("  redundant_joint: {}\n", joint));
        }
        if let Some(link) = &self.end_effector {
            yaml.push_str(&format!("  end_effector: {}\n", link));
        }
        yaml
    }
}
