//! Kinematic tree of links connected by fixed or revolute joints, and the forward
//! kinematics walk over it.
//!
//! Links and joints live in flat arenas and refer to each other by index. Parent links
//! own their outgoing edges (joint + child), joints hold no back references. The
//! traversal order is computed once when the tree is built, with an explicit stack, so
//! forward kinematics is a single pass without recursion.
//!
//! ```
//! extern crate nalgebra as na;
//! use na::Vector3;
//! use rs_cartesian_control::kinematic_traits::{ForwardKinematics, JointState};
//! use rs_cartesian_control::kinematic_tree::{Joint, KinematicTreeBuilder};
//! use rs_cartesian_control::transform::from_origin_rpy;
//!
//! // Two link planar arm, both links 1 m long, moving in the XY plane.
//! let tree = KinematicTreeBuilder::new()
//!     .add_link("base").add_link("upper").add_link("lower").add_link("tip")
//!     .add_joint("base", "upper",
//!                Joint::revolute("shoulder", from_origin_rpy([0.0; 3], [0.0; 3]), Vector3::z()).unwrap())
//!     .add_joint("upper", "lower",
//!                Joint::revolute("elbow", from_origin_rpy([1.0, 0.0, 0.0], [0.0; 3]), Vector3::z()).unwrap())
//!     .add_joint("lower", "tip", Joint::fixed("flange", from_origin_rpy([1.0, 0.0, 0.0], [0.0; 3])))
//!     .build()
//!     .expect("valid tree");
//!
//! let state = JointState::from_pairs([("elbow", 0.0), ("shoulder", 0.0)]);
//! let fk = tree.forward_kinematics(&state).unwrap();
//! assert!((fk.end_effector.translation.vector.x - 2.0).abs() < 1e-12);
//! assert_eq!(fk.joint_frames.len(), 2);
//! ```

extern crate nalgebra as na;

use std::collections::{HashMap, HashSet};
use na::{Unit, Vector3};
use tracing::debug;
use crate::control_error::ControlError;
use crate::kinematic_traits::{ForwardKinematics, JointFrame, JointState, KinematicState};
use crate::transform::{align_with_z, rotation_about, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    Fixed,
    /// Single axis rotation
    Revolute,
}

/// Immutable joint description.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,

    /// Offset of the joint from the parent link frame.
    pub origin: Transform,

    /// Rotation axis in the joint frame. Not used for fixed joints.
    pub axis: Unit<Vector3<f64>>,
}

impl Joint {
    /// Revolute joint. The axis is normalized and must not be zero.
    pub fn revolute(name: &str, origin: Transform, axis: Vector3<f64>) -> Result<Self, ControlError> {
        let norm = axis.norm();
        if !norm.is_finite() || norm < 1e-9 {
            return Err(ControlError::MalformedTree(
                format!("joint {} has no usable rotation axis {:?}", name, axis)));
        }
        Ok(Joint {
            name: name.to_string(),
            joint_type: JointType::Revolute,
            origin,
            axis: Unit::new_normalize(axis),
        })
    }

    pub fn fixed(name: &str, origin: Transform) -> Self {
        Joint {
            name: name.to_string(),
            joint_type: JointType::Fixed,
            origin,
            axis: Vector3::z_axis(),
        }
    }

    pub fn is_actuated(&self) -> bool {
        self.joint_type != JointType::Fixed
    }

    /// Motion of the joint at the given angle (identity for fixed joints).
    pub fn motion(&self, angle: f64) -> Transform {
        match self.joint_type {
            JointType::Fixed => Transform::identity(),
            JointType::Revolute => rotation_about(&self.axis, angle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,

    /// Indices of outgoing edges, in insertion order.
    edges: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Edge {
    joint: Joint,
    parent: LinkId,
    child: LinkId,
}

/// Collects links and joints, then validates them into a [KinematicTree].
#[derive(Debug, Default)]
pub struct KinematicTreeBuilder {
    links: Vec<String>,
    joints: Vec<(String, String, Joint)>,
    end_effector: Option<String>,
}

impl KinematicTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(mut self, name: &str) -> Self {
        self.links.push(name.to_string());
        self
    }

    /// Connects `parent` to `child` through the given joint.
    pub fn add_joint(mut self, parent: &str, child: &str, joint: Joint) -> Self {
        self.joints.push((parent.to_string(), child.to_string(), joint));
        self
    }

    /// Designates the end effector link. Without designation the only leaf is used or,
    /// if there are several, the last leaf reached by the traversal.
    pub fn end_effector(mut self, link: &str) -> Self {
        self.end_effector = Some(link.to_string());
        self
    }

    pub fn build(self) -> Result<KinematicTree, ControlError> {
        if self.links.is_empty() {
            return Err(ControlError::MalformedTree("tree has no links".into()));
        }

        let mut link_ids: HashMap<String, LinkId> = HashMap::new();
        let mut links = Vec::with_capacity(self.links.len());
        for name in self.links {
            if link_ids.contains_key(&name) {
                return Err(ControlError::MalformedTree(format!("duplicate link {}", name)));
            }
            link_ids.insert(name.clone(), LinkId(links.len()));
            links.push(Link { name, edges: Vec::new() });
        }

        let lookup = |name: &str, joint: &str| {
            link_ids.get(name).copied().ok_or_else(|| ControlError::MalformedTree(
                format!("joint {} refers to unknown link {}", joint, name)))
        };

        let mut joint_names: HashSet<String> = HashSet::new();
        let mut parent_edge: Vec<Option<usize>> = vec![None; links.len()];
        let mut edges: Vec<Edge> = Vec::with_capacity(self.joints.len());
        for (parent, child, joint) in self.joints {
            if !joint_names.insert(joint.name.clone()) {
                return Err(ControlError::MalformedTree(format!("duplicate joint {}", joint.name)));
            }
            let parent = lookup(&parent, &joint.name)?;
            let child = lookup(&child, &joint.name)?;
            if parent_edge[child.0].is_some() {
                return Err(ControlError::MalformedTree(
                    format!("link {} has more than one parent", links[child.0].name)));
            }
            parent_edge[child.0] = Some(edges.len());
            links[parent.0].edges.push(edges.len());
            edges.push(Edge { joint, parent, child });
        }

        let roots: Vec<usize> = (0..links.len()).filter(|&i| parent_edge[i].is_none()).collect();
        let root = match roots.as_slice() {
            [single] => LinkId(*single),
            [] => return Err(ControlError::MalformedTree("no root link, joints form a cycle".into())),
            _ => return Err(ControlError::MalformedTree(format!(
                "multiple root links: {}",
                roots.iter().map(|&i| links[i].name.as_str()).collect::<Vec<_>>().join(", ")))),
        };

        // Pre-order walk, children in insertion order.
        let mut order = Vec::with_capacity(edges.len());
        let mut visited = vec![false; links.len()];
        let mut leaves = Vec::new();
        let mut stack = vec![root];
        while let Some(link) = stack.pop() {
            visited[link.0] = true;
            let outgoing = &links[link.0].edges;
            if outgoing.is_empty() {
                leaves.push(link);
            }
            for &e in outgoing.iter().rev() {
                stack.push(edges[e].child);
            }
            if let Some(e) = parent_edge[link.0] {
                order.push(e);
            }
        }

        if let Some(stray) = visited.iter().position(|v| !v) {
            return Err(ControlError::MalformedTree(
                format!("link {} is not reachable from the root (cycle)", links[stray].name)));
        }

        let end_effector = match self.end_effector {
            Some(name) => {
                let id = *link_ids.get(&name).ok_or_else(|| ControlError::MalformedTree(
                    format!("end effector link {} does not exist", name)))?;
                if !links[id.0].edges.is_empty() {
                    return Err(ControlError::MalformedTree(
                        format!("end effector link {} is not a leaf", name)));
                }
                id
            }
            None => {
                // `leaves` is never empty for a finite tree
                let last = *leaves.last().ok_or_else(||
                    ControlError::MalformedTree("tree has no leaf link".into()))?;
                if leaves.len() > 1 {
                    debug!("{} leaf links, using {} as the end effector",
                           leaves.len(), links[last.0].name);
                }
                last
            }
        };

        // Edges from the end effector up to the root.
        let mut chain = vec![false; edges.len()];
        let mut cursor = end_effector;
        while let Some(e) = parent_edge[cursor.0] {
            chain[e] = true;
            cursor = edges[e].parent;
        }

        let actuated = order.iter()
            .filter(|&&e| edges[e].joint.is_actuated())
            .map(|&e| edges[e].joint.name.clone())
            .collect();

        Ok(KinematicTree { links, edges, order, chain, root, end_effector, actuated })
    }
}

/// Rooted tree of links, immutable once built.
#[derive(Debug, Clone)]
pub struct KinematicTree {
    links: Vec<Link>,
    edges: Vec<Edge>,

    /// Edge indices in traversal order (parents before children).
    order: Vec<usize>,

    /// True for edges on the path from the root to the end effector.
    chain: Vec<bool>,
    root: LinkId,
    end_effector: LinkId,
    actuated: Vec<String>,
}

impl KinematicTree {
    pub fn root(&self) -> &str {
        &self.links[self.root.0].name
    }

    pub fn end_effector(&self) -> &str {
        &self.links[self.end_effector.0].name
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// All joints (fixed included) in traversal order.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.order.iter().map(move |&e| &self.edges[e].joint)
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.edges.iter().map(|e| &e.joint).find(|j| j.name == name)
    }
}

impl ForwardKinematics for KinematicTree {
    fn actuated_joints(&self) -> &[String] {
        &self.actuated
    }

    /// Accumulates `parent * origin * motion` along the tree. For each revolute joint also
    /// records `parent * origin * align_with_z(axis)`, the joint frame with Z along the axis.
    fn forward_kinematics(&self, state: &JointState) -> Result<KinematicState, ControlError> {
        let mut link_poses = vec![Transform::identity(); self.links.len()];
        let mut joint_frames = Vec::with_capacity(self.actuated.len());

        for &e in &self.order {
            let edge = &self.edges[e];
            let joint = &edge.joint;
            let at_joint = link_poses[edge.parent.0] * joint.origin;

            let motion = if joint.is_actuated() {
                let angle = state.position(&joint.name)
                    .ok_or_else(|| ControlError::UnknownJoint(joint.name.clone()))?;
                joint_frames.push(JointFrame {
                    name: joint.name.clone(),
                    frame: at_joint * align_with_z(&joint.axis),
                    angle,
                    drives_end_effector: self.chain[e],
                });
                joint.motion(angle)
            } else {
                Transform::identity()
            };
            link_poses[edge.child.0] = at_joint * motion;
        }

        Ok(KinematicState {
            end_effector: link_poses[self.end_effector.0],
            joint_frames,
        })
    }
}

/// Forward kinematics of the tree for the given measurements.
pub fn compute_forward_kinematics(tree: &KinematicTree, state: &JointState)
                                  -> Result<KinematicState, ControlError> {
    tree.forward_kinematics(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use crate::transform::from_origin_rpy;

    const SMALL: f64 = 1e-12;

    fn origin(x: f64, y: f64, z: f64) -> Transform {
        from_origin_rpy([x, y, z], [0.0; 3])
    }

    fn planar_two_link() -> KinematicTree {
        KinematicTreeBuilder::new()
            .add_link("base").add_link("l1").add_link("l2").add_link("tip")
            .add_joint("base", "l1", Joint::revolute("j1", origin(0.0, 0.0, 0.0), Vector3::z()).unwrap())
            .add_joint("l1", "l2", Joint::revolute("j2", origin(1.0, 0.0, 0.0), Vector3::z()).unwrap())
            .add_joint("l2", "tip", Joint::fixed("tcp", origin(1.0, 0.0, 0.0)))
            .build()
            .expect("valid tree")
    }

    #[test]
    fn test_planar_arm_positions() {
        let tree = planar_two_link();
        assert_eq!(tree.root(), "base");
        assert_eq!(tree.end_effector(), "tip");
        assert_eq!(tree.actuated_joints(), &["j1".to_string(), "j2".to_string()]);

        let state = JointState::from_pairs([("j2", FRAC_PI_2), ("j1", 0.0)]);
        let fk = compute_forward_kinematics(&tree, &state).unwrap();
        let p = fk.end_effector.translation.vector;
        assert!((p - Vector3::new(1.0, 1.0, 0.0)).norm() < SMALL, "got {:?}", p);

        // Second joint frame sits at the elbow with Z along the axis
        let elbow = &fk.joint_frames[1];
        assert_eq!(elbow.name, "j2");
        assert!((elbow.frame.translation.vector - Vector3::new(1.0, 0.0, 0.0)).norm() < SMALL);
        assert!((elbow.frame.rotation * Vector3::z() - Vector3::z()).norm() < SMALL);
        assert_eq!(fk.angles().as_slice(), &[0.0, FRAC_PI_2]);
    }

    #[test]
    fn test_aligned_frame_for_tilted_axis() {
        let tree = KinematicTreeBuilder::new()
            .add_link("base").add_link("l1")
            .add_joint("base", "l1", Joint::revolute("j1", origin(0.0, 0.0, 0.5), Vector3::y()).unwrap())
            .build()
            .unwrap();
        let fk = tree.forward_kinematics(&JointState::from_pairs([("j1", 0.3)])).unwrap();
        let frame = &fk.joint_frames[0].frame;
        assert!((frame.rotation * Vector3::z() - Vector3::y()).norm() < SMALL);
        // The aligned frame does not move with the joint angle
        let fk0 = tree.forward_kinematics(&JointState::from_pairs([("j1", 0.0)])).unwrap();
        assert!(fk0.joint_frames[0].frame.rotation.angle_to(&frame.rotation) < SMALL);
    }

    #[test]
    fn test_missing_measurement() {
        let tree = planar_two_link();
        let state = JointState::from_pairs([("j1", 0.0), ("unrelated", 1.0)]);
        match tree.forward_kinematics(&state) {
            Err(ControlError::UnknownJoint(name)) => assert_eq!(name, "j2"),
            other => panic!("expected unknown joint, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_measurements_ignored() {
        let tree = planar_two_link();
        let state = JointState::from_pairs([("j1", 0.0), ("gripper", 0.7), ("j2", 0.0)]);
        assert!(tree.forward_kinematics(&state).is_ok());
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let result = KinematicTreeBuilder::new()
            .add_link("a").add_link("b").add_link("c")
            .add_joint("a", "b", Joint::fixed("ab", Transform::identity()))
            .build();
        assert!(matches!(result, Err(ControlError::MalformedTree(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = KinematicTreeBuilder::new()
            .add_link("root").add_link("a").add_link("b")
            .add_joint("a", "b", Joint::fixed("ab", Transform::identity()))
            .add_joint("b", "a", Joint::fixed("ba", Transform::identity()))
            .build();
        assert!(matches!(result, Err(ControlError::MalformedTree(_))), "{:?}", result);
    }

    #[test]
    fn test_two_parents_rejected() {
        let result = KinematicTreeBuilder::new()
            .add_link("a").add_link("b").add_link("c")
            .add_joint("a", "c", Joint::fixed("ac", Transform::identity()))
            .add_joint("b", "c", Joint::fixed("bc", Transform::identity()))
            .build();
        assert!(matches!(result, Err(ControlError::MalformedTree(_))));
    }

    #[test]
    fn test_zero_axis_rejected() {
        assert!(Joint::revolute("j", Transform::identity(), Vector3::zeros()).is_err());
    }

    #[test]
    fn test_branches_and_end_effector() {
        // Torso with an arm and a camera mast; only the arm carries the end effector.
        let tree = KinematicTreeBuilder::new()
            .add_link("base").add_link("mast").add_link("camera").add_link("arm").add_link("hand")
            .add_joint("base", "mast", Joint::revolute("pan", origin(0.0, 0.0, 1.0), Vector3::z()).unwrap())
            .add_joint("mast", "camera", Joint::fixed("cam_mount", origin(0.0, 0.0, 0.1)))
            .add_joint("base", "arm", Joint::revolute("shoulder", origin(0.2, 0.0, 0.5), Vector3::y()).unwrap())
            .add_joint("arm", "hand", Joint::fixed("wrist", origin(0.5, 0.0, 0.0)))
            .end_effector("hand")
            .build()
            .unwrap();
        assert_eq!(tree.actuated_joints(), &["pan".to_string(), "shoulder".to_string()]);
        let fk = tree.forward_kinematics(
            &JointState::from_pairs([("pan", 0.4), ("shoulder", 0.0)])).unwrap();
        assert!(!fk.joint_frames[0].drives_end_effector);
        assert!(fk.joint_frames[1].drives_end_effector);
        assert!((fk.end_effector.translation.vector - Vector3::new(0.7, 0.0, 0.5)).norm() < SMALL);

        let not_leaf = KinematicTreeBuilder::new()
            .add_link("base").add_link("tip")
            .add_joint("base", "tip", Joint::fixed("f", Transform::identity()))
            .end_effector("base")
            .build();
        assert!(not_leaf.is_err());
    }

    #[test]
    fn test_default_end_effector_is_last_leaf() {
        let tree = KinematicTreeBuilder::new()
            .add_link("base").add_link("left").add_link("right")
            .add_joint("base", "left", Joint::fixed("l", origin(0.0, 1.0, 0.0)))
            .add_joint("base", "right", Joint::fixed("r", origin(0.0, -1.0, 0.0)))
            .build()
            .unwrap();
        assert_eq!(tree.end_effector(), "right");
        assert_eq!(tree.joints().map(|j| j.name.as_str()).collect::<Vec<_>>(), vec!["l", "r"]);
    }
}
