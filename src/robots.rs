//! Hardcoded kinematic trees for a few robots, used by the demo and tests

use nalgebra::Vector3;

use crate::control_error::ControlError;
use crate::kinematic_tree::{Joint, KinematicTree, KinematicTreeBuilder};
use crate::transform::from_origin_rpy;

/// Two revolute joints about Z with links of the given lengths along X, ending in `tip`.
/// At zero angles the tip is at `(l1 + l2, 0, 0)`.
pub fn planar_two_link(l1: f64, l2: f64) -> Result<KinematicTree, ControlError> {
    KinematicTreeBuilder::new()
        .add_link("base").add_link("upper").add_link("fore").add_link("tip")
        .add_joint("base", "upper",
                   Joint::revolute("joint1", from_origin_rpy([0.0; 3], [0.0; 3]), Vector3::z())?)
        .add_joint("upper", "fore",
                   Joint::revolute("joint2", from_origin_rpy([l1, 0.0, 0.0], [0.0; 3]), Vector3::z())?)
        .add_joint("fore", "tip", Joint::fixed("tcp", from_origin_rpy([l2, 0.0, 0.0], [0.0; 3])))
        .build()
}

/// Seven joint arm with the layout of the popular lightweight cobots
/// (alternating Z and Y axes, 0.36 / 0.42 / 0.40 / 0.126 m segments).
/// At zero angles it stands straight up, which is singular; bend it before tracking.
pub fn seven_joint_arm() -> Result<KinematicTree, ControlError> {
    let segments: [(&str, [f64; 3], Vector3<f64>); 7] = [
        ("a1", [0.0, 0.0, 0.1575], Vector3::z()),
        ("a2", [0.0, 0.0, 0.2025], Vector3::y()),
        ("a3", [0.0, 0.0, 0.2045], Vector3::z()),
        ("a4", [0.0, 0.0, 0.2155], -Vector3::y()),
        ("a5", [0.0, 0.0, 0.1845], Vector3::z()),
        ("a6", [0.0, 0.0, 0.2155], Vector3::y()),
        ("a7", [0.0, 0.0, 0.0810], Vector3::z()),
    ];

    let mut builder = KinematicTreeBuilder::new().add_link("link_0");
    for (i, (name, xyz, axis)) in segments.into_iter().enumerate() {
        let parent = format!("link_{}", i);
        let child = format!("link_{}", i + 1);
        builder = builder
            .add_link(&child)
            .add_joint(&parent, &child, Joint::revolute(name, from_origin_rpy(xyz, [0.0; 3]), axis)?);
    }
    builder
        .add_link("flange")
        .add_joint("link_7", "flange", Joint::fixed("flange_mount", from_origin_rpy([0.0, 0.0, 0.045], [0.0; 3])))
        .end_effector("flange")
        .build()
}
