//! Differential (velocity level) inverse kinematics.
//!
//! The pose error between the current and desired end effector poses is turned into a
//! desired twist by a proportional gain, and the twist into joint velocities through the
//! damped least squares pseudo-inverse of the Jacobian. For redundant robots a secondary
//! objective is projected into the null space of the Jacobian and added on top.
//!
//! This is a P-controller on the SE(3) error, not exact geodesic tracking: large errors
//! overshoot, and rotation errors are always taken as the minimal angle representative.

extern crate nalgebra as na;

use na::{DVector, Vector6};
use tracing::{debug, warn};
use crate::control_error::ControlError;
use crate::jacobian::Jacobian;
use crate::objectives::{NullSpaceObjective, ObjectiveContext, RedundantJointPosture};
use crate::parameters::ControllerParameters;
use crate::transform::{rotation_angle_axis, translation_of, Transform};
use crate::utils::is_valid;

/// Dimension of the end effector task (3 translations, 3 rotations).
pub const TASK_DIMENSIONS: usize = 6;

/// Joint velocities of one control step, with diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityCommand {
    /// One velocity per joint, in traversal order (rad/s).
    pub velocities: DVector<f64>,

    /// Rotation error could not be extracted; only the translation error was used.
    pub degenerate_rotation: bool,

    /// The null space objective contributed to the velocities.
    pub redundancy_applied: bool,

    /// Factor the velocities were multiplied by to respect the velocity limit (1.0 if none).
    pub scale: f64,
}

/// Pose error as a twist `[translation; angle * axis]` of `current^-1 * desired`, that is,
/// the desired pose seen from the current end effector frame.
pub fn pose_error(current: &Transform, desired: &Transform) -> Result<Vector6<f64>, ControlError> {
    let delta = current.inverse() * desired;
    let translation = translation_of(&delta);
    let (angle, axis) = rotation_angle_axis(&delta)?;
    let rotation = axis.into_inner() * angle;
    Ok(Vector6::new(
        translation.x, translation.y, translation.z,
        rotation.x, rotation.y, rotation.z,
    ))
}

/// Scales the whole vector down if any component exceeds `max`, preserving the direction.
/// Returns the applied factor.
pub fn limit_velocities(velocities: &mut DVector<f64>, max: f64) -> f64 {
    let largest = velocities.amax();
    if largest <= max || largest == 0.0 {
        return 1.0;
    }
    let scale = max / largest;
    *velocities *= scale;
    scale
}

/// Damped least squares controller with a pluggable null space objective.
#[derive(Debug)]
pub struct DifferentialController {
    parameters: ControllerParameters,
    objective: Box<dyn NullSpaceObjective>,
}

impl DifferentialController {
    pub fn new(parameters: ControllerParameters, objective: Box<dyn NullSpaceObjective>) -> Self {
        DifferentialController { parameters, objective }
    }

    /// Controller whose redundancy target drives the joint at `joint_index`.
    pub fn with_redundant_joint(parameters: ControllerParameters, joint_index: usize) -> Self {
        let objective = RedundantJointPosture { joint_index, gain: parameters.redundancy_gain };
        Self::new(parameters, Box::new(objective))
    }

    pub fn parameters(&self) -> &ControllerParameters {
        &self.parameters
    }

    /// Joint velocities that move the end effector from `current` toward `desired`.
    ///
    /// # Arguments
    ///
    /// * `jacobian` - Jacobian at the current configuration
    /// * `current` - Current end effector pose
    /// * `desired` - Desired end effector pose
    /// * `redundancy_target` - If set, pursue the null space objective with this target.
    ///   Only applied when there are more joints than task dimensions.
    /// * `current_angles` - Measured joint angles, traversal order
    ///
    /// # Errors
    ///
    /// `SingularConfiguration` when dimensions do not match or no finite result exists.
    /// Singular robot configurations are handled by damping, not reported.
    pub fn compute_joint_velocities(
        &self,
        jacobian: &Jacobian,
        current: &Transform,
        desired: &Transform,
        redundancy_target: Option<f64>,
        current_angles: &DVector<f64>,
    ) -> Result<VelocityCommand, ControlError> {
        let n = jacobian.dof();
        if current_angles.len() != n {
            return Err(ControlError::SingularConfiguration(format!(
                "{} joint angles for a Jacobian with {} columns", current_angles.len(), n)));
        }

        let (error, degenerate_rotation) = match pose_error(current, desired) {
            Ok(error) => (error, false),
            Err(ControlError::DegenerateRotation(msg)) => {
                warn!("Rotation error unavailable ({}), tracking translation only", msg);
                let t = translation_of(&(current.inverse() * desired));
                (Vector6::new(t.x, t.y, t.z, 0.0, 0.0, 0.0), true)
            }
            Err(other) => return Err(other),
        };

        let desired_twist = error * self.parameters.gain;
        let j_pinv = jacobian.damped_pseudo_inverse(self.parameters.damping)?;
        let mut velocities = &j_pinv * desired_twist;

        let mut redundancy_applied = false;
        if let Some(target) = redundancy_target {
            if n > TASK_DIMENSIONS {
                let context = ObjectiveContext { joint_angles: current_angles, target };
                let secondary = self.objective.desired_null_space_velocity(&context);
                if secondary.len() != n {
                    return Err(ControlError::SingularConfiguration(format!(
                        "null space objective returned {} values for {} joints", secondary.len(), n)));
                }
                let projector = jacobian.null_space_projector(self.parameters.pseudo_inverse_epsilon)?;
                velocities += projector * secondary;
                redundancy_applied = true;
            } else {
                debug!("Redundancy target ignored: {} joints leave no redundant freedom", n);
            }
        }

        if !is_valid(velocities.as_slice()) {
            return Err(ControlError::SingularConfiguration(
                "joint velocities are not finite".into()));
        }

        let scale = limit_velocities(&mut velocities, self.parameters.max_joint_velocity);
        if scale < 1.0 {
            warn!("Joint velocities scaled by {:.3} to respect the limit of {} rad/s",
                  scale, self.parameters.max_joint_velocity);
        }

        Ok(VelocityCommand { velocities, degenerate_rotation, redundancy_applied, scale })
    }
}
