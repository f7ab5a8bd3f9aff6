//! Errors raised by the kinematics and control core

use std::fmt;

/// Failures of the kinematic tree, the Jacobian algebra and the controller.
///
/// Structural errors (`MalformedTree`, `SingularConfiguration`) are detected once and must
/// abort initialization. The remaining ones are recoverable in the control loop: the cycle
/// where they happen degrades to a safe output and the loop keeps running.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The kinematic description is not a single rooted tree, or is otherwise inconsistent.
    MalformedTree(String),

    /// A joint of the tree has no matching measurement (or the other way around).
    UnknownJoint(String),

    /// Rotation block has no eigenvector for the eigenvalue 1 within tolerance.
    DegenerateRotation(String),

    /// Matrix dimensions do not allow computing the (damped) pseudo-inverse.
    SingularConfiguration(String),
}

impl ControlError {
    /// True if the control loop may continue after this error, producing a safe
    /// output for the current cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ControlError::UnknownJoint(_) | ControlError::DegenerateRotation(_))
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ControlError::MalformedTree(ref msg) =>
                write!(f, "Malformed kinematic tree: {}", msg),
            ControlError::UnknownJoint(ref name) =>
                write!(f, "Unknown joint: {}", name),
            ControlError::DegenerateRotation(ref msg) =>
                write!(f, "Degenerate rotation: {}", msg),
            ControlError::SingularConfiguration(ref msg) =>
                write!(f, "Singular configuration: {}", msg),
        }
    }
}

impl std::error::Error for ControlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ControlError::UnknownJoint("joint_3".into()).is_recoverable());
        assert!(ControlError::DegenerateRotation("no axis".into()).is_recoverable());
        assert!(!ControlError::MalformedTree("two roots".into()).is_recoverable());
        assert!(!ControlError::SingularConfiguration("6x0".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let e = ControlError::UnknownJoint("elbow".into());
        assert_eq!(e.to_string(), "Unknown joint: elbow");
    }
}
