//! Secondary objectives for kinematically redundant robots.
//!
//! An objective proposes joint velocities; the controller projects them into the null
//! space of the Jacobian, so they never disturb the end effector task. New strategies are
//! added by implementing [NullSpaceObjective], without touching the primary task.

extern crate nalgebra as na;

use std::fmt::Debug;
use na::DVector;

/// What an objective can see in the current cycle.
pub struct ObjectiveContext<'a> {
    /// Measured joint angles in traversal order.
    pub joint_angles: &'a DVector<f64>,

    /// Latest redundancy target received by the control loop.
    pub target: f64,
}

pub trait NullSpaceObjective: Debug + Send + Sync {
    /// Joint velocities the objective would like to have, before null space projection.
    /// Must return one value per joint.
    fn desired_null_space_velocity(&self, context: &ObjectiveContext) -> DVector<f64>;
}

/// Drives one designated joint toward the commanded target angle.
#[derive(Debug, Clone)]
pub struct RedundantJointPosture {
    /// Index of the joint in traversal order
    pub joint_index: usize,
    pub gain: f64,
}

impl NullSpaceObjective for RedundantJointPosture {
    fn desired_null_space_velocity(&self, context: &ObjectiveContext) -> DVector<f64> {
        let mut velocity = DVector::zeros(context.joint_angles.len());
        if self.joint_index < velocity.len() {
            velocity[self.joint_index] =
                self.gain * (context.target - context.joint_angles[self.joint_index]);
        }
        velocity
    }
}

/// Pulls every joint toward a rest posture. The redundancy target is not used.
#[derive(Debug, Clone)]
pub struct JointCentering {
    pub centers: DVector<f64>,
    pub gain: f64,
}

impl NullSpaceObjective for JointCentering {
    fn desired_null_space_velocity(&self, context: &ObjectiveContext) -> DVector<f64> {
        let angles = context.joint_angles;
        if angles.len() != self.centers.len() {
            return DVector::zeros(angles.len());
        }
        (&self.centers - angles) * self.gain
    }
}
