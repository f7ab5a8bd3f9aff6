//! Provides tool and base for the robot.
//! Both Tool and Base take arbitrary implementation of [ForwardKinematics] and are such
//! implementations themselves. Hence, they can be cascaded, like base, having the robot,
//! that robot having a tool:
//! ```
//! use std::sync::Arc;
//! use nalgebra::{Isometry3, Vector3};
//! use rs_cartesian_control::kinematic_traits::{ForwardKinematics, JointState};
//! use rs_cartesian_control::kinematic_tree::{Joint, KinematicTreeBuilder};
//! use rs_cartesian_control::tool::{Base, Tool};
//!
//! let arm = KinematicTreeBuilder::new()
//!     .add_link("base").add_link("flange")
//!     .add_joint("base", "flange",
//!                Joint::revolute("j1", Isometry3::identity(), Vector3::z()).unwrap())
//!     .build()
//!     .unwrap();
//!
//! // Half meter high pedestal
//! let on_pedestal = Base {
//!     robot: Arc::new(arm),
//!     base: Isometry3::translation(0.0, 0.0, 0.5),
//! };
//!
//! // Tool extends 1 meter along the flange X axis
//! let complete = Tool {
//!     robot: Arc::new(on_pedestal),
//!     tool: Isometry3::translation(1.0, 0.0, 0.0),
//! };
//!
//! let state = complete.forward_kinematics(&JointState::from_pairs([("j1", 0.0)])).unwrap();
//! let tip = state.end_effector.translation.vector;
//! assert!((tip - Vector3::new(1.0, 0.0, 0.5)).norm() < 1e-12);
//! ```

extern crate nalgebra as na;

use std::sync::Arc;
use na::Isometry3;

use crate::control_error::ControlError;
use crate::kinematic_traits::{ForwardKinematics, JointState, KinematicState};

/// Defines the fixed tool that is attached to the end effector link of the robot.
/// The tool moves with the robot, providing additional translation and, if needed,
/// rotation. The controlled pose becomes the tool center point.
#[derive(Clone)]
pub struct Tool {
    pub robot: Arc<dyn ForwardKinematics>,

    /// Transformation from the end effector link to the tool center point.
    pub tool: Isometry3<f64>,
}

/// Defines the fixed base that holds the robot, moving it to its installed location.
/// Commands are then expressed in the world frame rather than in the robot root frame.
#[derive(Clone)]
pub struct Base {
    pub robot: Arc<dyn ForwardKinematics>,

    /// Transformation from the world origin to the robot root link.
    pub base: Isometry3<f64>,
}

impl ForwardKinematics for Tool {
    fn actuated_joints(&self) -> &[String] {
        self.robot.actuated_joints()
    }

    fn forward_kinematics(&self, joint_state: &JointState) -> Result<KinematicState, ControlError> {
        let mut state = self.robot.forward_kinematics(joint_state)?;
        state.end_effector *= self.tool;
        Ok(state)
    }
}

impl ForwardKinematics for Base {
    fn actuated_joints(&self) -> &[String] {
        self.robot.actuated_joints()
    }

    fn forward_kinematics(&self, joint_state: &JointState) -> Result<KinematicState, ControlError> {
        let mut state = self.robot.forward_kinematics(joint_state)?;
        state.end_effector = self.base * state.end_effector;
        for joint in state.joint_frames.iter_mut() {
            joint.frame = self.base * joint.frame;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::{UnitQuaternion, Vector3};
    use crate::jacobian::Jacobian;
    use crate::kinematic_tree::{Joint, KinematicTree, KinematicTreeBuilder};
    use crate::utils::assert_pose_eq;

    fn planar_arm() -> KinematicTree {
        KinematicTreeBuilder::new()
            .add_link("base").add_link("l1").add_link("tip")
            .add_joint("base", "l1",
                       Joint::revolute("j1", Isometry3::identity(), Vector3::z()).unwrap())
            .add_joint("l1", "tip",
                       Joint::revolute("j2", Isometry3::translation(1.0, 0.0, 0.0), Vector3::z()).unwrap())
            .build()
            .unwrap()
    }

    fn state() -> JointState {
        JointState::from_pairs([("j1", 0.3), ("j2", -0.2)])
    }

    #[test]
    fn test_tool_extends_end_effector() {
        let arm = Arc::new(planar_arm());
        let tool = Tool { robot: arm.clone(), tool: Isometry3::translation(0.5, 0.0, 0.0) };

        let bare = arm.forward_kinematics(&state()).unwrap();
        let tooled = tool.forward_kinematics(&state()).unwrap();
        assert_pose_eq(&tooled.end_effector, &(bare.end_effector * tool.tool), 1e-12, 1e-12);
        assert_eq!(tool.actuated_joints(), arm.actuated_joints());

        // The tool lengthens the lever of the last joint
        let jacobian = Jacobian::from_state(&tooled);
        assert!((jacobian.matrix()[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_base_keeps_body_jacobian() {
        let arm = Arc::new(planar_arm());
        let base = Base {
            robot: arm.clone(),
            base: Isometry3::from_parts(
                Vector3::new(1.0, 2.0, 0.5).into(),
                UnitQuaternion::from_euler_angles(0.4, -0.1, 1.2)),
        };

        let bare = arm.forward_kinematics(&state()).unwrap();
        let placed = base.forward_kinematics(&state()).unwrap();
        assert_pose_eq(&placed.end_effector, &(base.base * bare.end_effector), 1e-12, 1e-12);

        let difference = Jacobian::from_state(&bare).matrix() - Jacobian::from_state(&placed).matrix();
        assert!(difference.amax() < 1e-9);
    }

    #[test]
    fn test_errors_pass_through() {
        let tool = Tool { robot: Arc::new(planar_arm()), tool: Isometry3::identity() };
        let result = tool.forward_kinematics(&JointState::from_pairs([("j1", 0.0)]));
        assert!(matches!(result, Err(ControlError::UnknownJoint(_))));
    }
}
