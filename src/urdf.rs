//! Supports building the kinematic tree from URDF (optional)

extern crate sxd_document;

use std::fs::read_to_string;
use std::path::Path;
use nalgebra::Vector3;
use regex::Regex;
use sxd_document::{dom, parser, QName};
use tracing::debug;

use crate::kinematic_tree::{Joint, KinematicTree, KinematicTreeBuilder};
use crate::parameter_error::ParameterError;
use crate::transform::from_origin_rpy;

/// Reads the URDF file and builds the kinematic tree it describes.
/// XACRO files may also work as long as numeric values are written literally
/// (or as `${radians(deg)}` for angles).
///
/// # Parameters
/// - `path`: the location of URDF or XACRO file to load from.
/// - `end_effector`: name of the controlled link. If not given, the last leaf link is used.
///
/// # Example
/// ```
/// use rs_cartesian_control::kinematic_traits::ForwardKinematics;
/// let tree = rs_cartesian_control::urdf::from_urdf_file(
///     "src/tests/data/planar_arm.urdf", None).expect("readable URDF");
/// assert_eq!(tree.actuated_joints(), ["shoulder", "elbow"]);
/// ```
///
/// # Errors
/// `IoError` if the file cannot be read, otherwise same as [from_urdf].
pub fn from_urdf_file<P: AsRef<Path>>(path: P, end_effector: Option<&str>)
                                      -> Result<KinematicTree, ParameterError> {
    let xml_content = read_to_string(path)?;
    from_urdf(&xml_content, end_effector)
}

/// Parses URDF XML content into the kinematic tree.
///
/// Links are taken from `<link name>`, joints from `<joint name type>` with their `<parent>`,
/// `<child>`, `<origin xyz rpy>` and `<axis xyz>` (default `1 0 0`). Joint types `revolute`
/// and `continuous` are actuated, `fixed` is rigid; other types are not supported.
///
/// # Errors
/// - `XmlProcessingError` if the document is not well-formed XML.
/// - `MissingField`, `ParseError`, `WrongAngle` for missing or unreadable attributes.
/// - `Unsupported` for joint types other than fixed, revolute or continuous.
/// - `Tree` if the links and joints do not form a valid tree.
pub fn from_urdf(xml_content: &str, end_effector: Option<&str>) -> Result<KinematicTree, ParameterError> {
    let package = parser::parse(xml_content)
        .map_err(|e| ParameterError::XmlProcessingError(format!("Failed to parse URDF: {}", e)))?;
    let document = package.as_document();

    let root_element = document.root().children().into_iter()
        .find_map(|e| e.element())
        .ok_or_else(|| ParameterError::XmlProcessingError("No root element found".into()))?;

    let mut description = RobotDescription::default();
    collect_elements(root_element, &mut description)?;
    debug!("URDF describes {} links and {} joints",
        description.links.len(), description.joints.len());

    let mut builder = KinematicTreeBuilder::new();
    for link in &description.links {
        builder = builder.add_link(link);
    }
    for joint in description.joints {
        builder = builder.add_joint(&joint.parent, &joint.child, joint.joint);
    }
    if let Some(name) = end_effector {
        builder = builder.end_effector(name);
    }
    Ok(builder.build()?)
}

#[derive(Default)]
struct RobotDescription {
    links: Vec<String>,
    joints: Vec<JointData>,
}

struct JointData {
    parent: String,
    child: String,
    joint: Joint,
}

// Recursive, as xacro may wrap links and joints into macros
fn collect_elements(element: dom::Element, description: &mut RobotDescription) -> Result<(), ParameterError> {
    let link_tag = QName::new("link");
    let joint_tag = QName::new("joint");
    // Transmissions and gazebo extensions name joints without describing them
    let skipped = [QName::new("transmission"), QName::new("gazebo")];

    for child in element.children().into_iter().filter_map(|e| e.element()) {
        if skipped.contains(&child.name()) {
            continue;
        }
        if child.name() == link_tag {
            description.links.push(required_attribute(child, "name", "link")?.to_string());
        } else if child.name() == joint_tag {
            description.joints.push(read_joint(child)?);
        } else {
            collect_elements(child, description)?;
        }
    }
    Ok(())
}

fn read_joint(element: dom::Element) -> Result<JointData, ParameterError> {
    let name = required_attribute(element, "name", "joint")?;
    let joint_type = required_attribute(element, "type", name)?;

    let parent = child_element(element, "parent")
        .ok_or_else(|| ParameterError::MissingField(format!("parent of joint {}", name)))?;
    let parent = required_attribute(parent, "link", name)?.to_string();
    let child = child_element(element, "child")
        .ok_or_else(|| ParameterError::MissingField(format!("child of joint {}", name)))?;
    let child = required_attribute(child, "link", name)?.to_string();

    let (xyz, rpy) = match child_element(element, "origin") {
        Some(origin) => (
            origin.attribute("xyz").map(|a| parse_triplet(a.value(), name)).transpose()?.unwrap_or([0.0; 3]),
            origin.attribute("rpy").map(|a| parse_rpy(a.value(), name)).transpose()?.unwrap_or([0.0; 3]),
        ),
        None => ([0.0; 3], [0.0; 3]),
    };
    let origin = from_origin_rpy(xyz, rpy);

    let joint = match joint_type {
        "fixed" => Joint::fixed(name, origin),
        "revolute" | "continuous" => {
            let axis = match child_element(element, "axis").and_then(|a| a.attribute("xyz")) {
                Some(xyz) => parse_triplet(xyz.value(), name)?,
                None => [1.0, 0.0, 0.0],
            };
            Joint::revolute(name, origin, Vector3::from(axis))?
        }
        other => {
            return Err(ParameterError::Unsupported(
                format!("Joint {} has type {}, only fixed, revolute and continuous are supported", name, other)));
        }
    };

    Ok(JointData { parent, child, joint })
}

fn child_element<'d>(element: dom::Element<'d>, tag: &str) -> Option<dom::Element<'d>> {
    let tag = QName::new(tag);
    element.children().into_iter()
        .find_map(|e| e.element().filter(|el| el.name() == tag))
}

fn required_attribute<'d>(element: dom::Element<'d>, attribute: &str, owner: &str)
                          -> Result<&'d str, ParameterError> {
    element.attribute(attribute)
        .map(|a| a.value())
        .ok_or_else(|| ParameterError::MissingField(format!("{} attribute of {}", attribute, owner)))
}

fn parse_triplet(text: &str, owner: &str) -> Result<[f64; 3], ParameterError> {
    let values: Vec<f64> = text.split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| ParameterError::ParseError(format!("{} in {}: '{}'", e, owner, text)))?;
    to_triplet(values, text, owner)
}

fn parse_rpy(text: &str, owner: &str) -> Result<[f64; 3], ParameterError> {
    let values: Vec<f64> = text.split_whitespace()
        .map(parse_angle)
        .collect::<Result<_, _>>()?;
    to_triplet(values, text, owner)
}

fn to_triplet(values: Vec<f64>, text: &str, owner: &str) -> Result<[f64; 3], ParameterError> {
    <[f64; 3]>::try_from(values).map_err(|_| ParameterError::ParseError(
        format!("Expected exactly three values in {}: '{}'", owner, text)))
}

fn parse_angle(attr_value: &str) -> Result<f64, ParameterError> {
    // ${radians(<number>)} format that is common in xacro
    let re = Regex::new(r"^\$\{radians\((-?\d+(\.\d+)?)\)\}$")
        .map_err(|_| ParameterError::ParseError("Invalid regex pattern".to_string()))?;

    if let Some(caps) = re.captures(attr_value) {
        let degrees_str = caps.get(1)
            .ok_or_else(|| ParameterError::WrongAngle(format!("Bad representation: {}", attr_value)))?
            .as_str();
        let degrees: f64 = degrees_str.parse()
            .map_err(|_| ParameterError::WrongAngle(attr_value.to_string()))?;
        Ok(degrees.to_radians())
    } else {
        // Plain number is in radians
        attr_value.parse()
            .map_err(|_| ParameterError::WrongAngle(attr_value.to_string()))
    }
}
