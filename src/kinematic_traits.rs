//! Types shared between the kinematic model, the Jacobian and the controller.

extern crate nalgebra as na;

use na::DVector;
use crate::control_error::ControlError;
use crate::transform::Transform;

/// Joint measurements as (joint name, angle in radians) pairs. The order is whatever the
/// source delivered and may differ from the tree order; lookups are always by name.
/// ```
/// use rs_cartesian_control::kinematic_traits::JointState;
///
/// let state = JointState::from_pairs([("shoulder", 0.1), ("elbow", -0.4)]);
/// assert_eq!(state.position("elbow"), Some(-0.4));
/// assert_eq!(state.position("wrist"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointState {
    pub entries: Vec<(String, f64)>,
}

impl JointState {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        JointState { entries: pairs.into_iter().map(|(n, q)| (n.into(), q)).collect() }
    }

    /// Builds the state from parallel name and position arrays, as joint state messages
    /// usually carry them. Surplus entries of the longer array are dropped.
    pub fn from_names_positions(names: &[String], positions: &[f64]) -> Self {
        JointState {
            entries: names.iter().cloned().zip(positions.iter().copied()).collect(),
        }
    }

    /// Angle of the named joint. If the name appears more than once, the first entry wins.
    pub fn position(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, q)| *q)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Frame of an actuated joint, expressed in the base frame, oriented so that its local Z
/// axis is the motion axis of the joint.
#[derive(Debug, Clone)]
pub struct JointFrame {
    pub name: String,
    pub frame: Transform,

    /// Measured angle of this joint in the cycle the frame was computed for.
    pub angle: f64,

    /// False for joints on branches that do not carry the end effector. Such joints
    /// cannot move the end effector and get a zero Jacobian column.
    pub drives_end_effector: bool,
}

/// Result of forward kinematics for one set of joint measurements.
#[derive(Debug, Clone)]
pub struct KinematicState {
    pub end_effector: Transform,

    /// One entry per actuated joint, in the traversal order of the tree.
    pub joint_frames: Vec<JointFrame>,
}

impl KinematicState {
    /// Measured angles in the traversal order.
    pub fn angles(&self) -> DVector<f64> {
        DVector::from_iterator(self.joint_frames.len(), self.joint_frames.iter().map(|f| f.angle))
    }
}

/// Anything that maps joint measurements to the end effector pose and the joint frames
/// the Jacobian is built from.
pub trait ForwardKinematics: Send + Sync {
    /// Names of actuated joints, in the order joint velocities are produced.
    fn actuated_joints(&self) -> &[String];

    fn forward_kinematics(&self, state: &JointState) -> Result<KinematicState, ControlError>;

    fn dof(&self) -> usize {
        self.actuated_joints().len()
    }
}
