//! Differential inverse kinematics for serial manipulators described as joint trees.
//!
//! Each control cycle the controller takes the latest joint measurements, computes forward
//! kinematics and the body Jacobian of the end effector, and maps the remaining pose error
//! to joint velocities through the damped least squares pseudo-inverse. On robots with more
//! than six joints, a secondary objective (by default, moving one designated joint toward a
//! commanded angle) is pursued in the null space of the Jacobian so that it never disturbs
//! the end effector.
//!
//! # Features
//!
//! - Arbitrary trees of revolute and fixed joints; branches that do not lead to the end effector
//!   get zero velocity.
//! - Damped least squares keeps joint velocities bounded near singular configurations.
//! - Commanded velocities are scaled down uniformly to respect the joint velocity limit, so
//!   the direction of motion is kept.
//! - Pose and redundancy commands expire when not refreshed; the robot then holds still.
//! - The robot can be equipped with the tool and placed on the base.
//! - Configuration from YAML and robot description from URDF (feature `allow_filesystem`).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nalgebra::Isometry3;
//! use rs_cartesian_control::control_loop::{CartesianController, ControlMode};
//! use rs_cartesian_control::kinematic_traits::JointState;
//! use rs_cartesian_control::parameters::ControlConfig;
//! use rs_cartesian_control::robots::planar_two_link;
//!
//! let robot = planar_two_link(1.0, 1.0).unwrap();
//! let controller = CartesianController::new(Arc::new(robot), &ControlConfig::default()).unwrap();
//!
//! controller.update_joint_state(JointState::from_pairs([("joint1", 0.0), ("joint2", 0.3)]));
//! controller.update_pose_command(Isometry3::translation(1.8, 0.4, 0.0));
//!
//! let output = controller.cycle();
//! assert_eq!(output.mode, ControlMode::Tracking);
//! assert_eq!(output.velocities.len(), 2);
//! ```

pub mod transform;
pub mod control_error;

pub mod kinematic_traits;
pub mod kinematic_tree;

pub mod jacobian;

pub mod objectives;
pub mod controller;
pub mod control_loop;

pub mod parameters;

#[cfg(feature = "allow_filesystem")]
pub mod parameters_from_file;

pub mod utils;

pub mod tool;

pub mod robots;

#[cfg(feature = "allow_filesystem")]
pub mod urdf;
#[cfg(feature = "allow_filesystem")]
pub mod parameter_error;

#[cfg(test)]
mod tests;
