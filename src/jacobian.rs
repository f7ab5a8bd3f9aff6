extern crate nalgebra as na;

use na::{DMatrix, DVector, Matrix3, Matrix6, Vector3, Vector6};
use na::linalg::SVD;
use rayon::prelude::*;
use crate::control_error::ControlError;
use crate::kinematic_traits::{JointFrame, KinematicState};
use crate::transform::Transform;

/// Struct representing the geometric Jacobian of the end effector
pub struct Jacobian {
    /// A 6xN matrix, one column per actuated joint in traversal order.
    ///
    /// The Jacobian matrix maps the joint velocities to the end-effector twist, expressed in
    /// the end effector frame. Rows 0..3 are linear velocity, rows 3..6 angular velocity.
    matrix: DMatrix<f64>,
}

impl Jacobian {
    /// Assembles the Jacobian from the joint-aligned frames and the end effector pose,
    /// all expressed in the base frame.
    ///
    /// # Arguments
    ///
    /// * `joint_frames` - Frames with local Z along each joint axis, in traversal order
    /// * `end_effector` - Current end effector pose
    pub fn new(joint_frames: &[JointFrame], end_effector: &Transform) -> Self {
        let matrix = compute_jacobian(joint_frames, end_effector);
        Self { matrix }
    }

    pub fn from_state(state: &KinematicState) -> Self {
        Self::new(&state.joint_frames, &state.end_effector)
    }

    /// Wraps an already computed matrix, which must have 6 rows.
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self, ControlError> {
        if matrix.nrows() != 6 {
            return Err(ControlError::SingularConfiguration(
                format!("Jacobian must have 6 rows, got {}x{}", matrix.nrows(), matrix.ncols())));
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of joint columns
    pub fn dof(&self) -> usize {
        self.matrix.ncols()
    }

    /// End effector twist produced by the given joint velocities.
    pub fn twist(&self, joint_velocities: &DVector<f64>) -> Result<Vector6<f64>, ControlError> {
        self.check_joint_vector(joint_velocities.len())?;
        let v = &self.matrix * joint_velocities;
        Ok(Vector6::from_iterator(v.iter().copied()))
    }

    /// Damped least squares pseudo-inverse `J^T (J J^T + damping^2 I)^-1`, an Nx6 matrix.
    /// Stays bounded near singular configurations where the exact pseudo-inverse explodes,
    /// at the cost of a small tracking bias.
    pub fn damped_pseudo_inverse(&self, damping: f64) -> Result<DMatrix<f64>, ControlError> {
        if self.dof() == 0 {
            return Err(ControlError::SingularConfiguration("Jacobian has no joint columns".into()));
        }
        if !damping.is_finite() || damping <= 0.0 {
            return Err(ControlError::SingularConfiguration(
                format!("damping must be positive and finite, got {}", damping)));
        }
        let jjt = &self.matrix * self.matrix.transpose();
        let to_invert = jjt + DMatrix::<f64>::identity(6, 6) * (damping * damping);
        let inverse = to_invert.try_inverse().ok_or_else(|| ControlError::SingularConfiguration(
            format!("damped normal matrix is not invertible (damping {})", damping)))?;
        Ok(self.matrix.transpose() * inverse)
    }

    /// Moore-Penrose pseudo-inverse through SVD, singular values below `epsilon` treated as zero.
    pub fn pseudo_inverse(&self, epsilon: f64) -> Result<DMatrix<f64>, ControlError> {
        if self.dof() == 0 {
            return Err(ControlError::SingularConfiguration("Jacobian has no joint columns".into()));
        }
        let svd = SVD::new(self.matrix.clone(), true, true);
        svd.pseudo_inverse(epsilon).map_err(|e| ControlError::SingularConfiguration(
            format!("Unable to compute the pseudoinverse of the Jacobian matrix: {}", e)))
    }

    /// Projector `I - J^+ J` onto the joint velocities that do not move the end effector.
    pub fn null_space_projector(&self, epsilon: f64) -> Result<DMatrix<f64>, ControlError> {
        let pinv = self.pseudo_inverse(epsilon)?;
        let n = self.dof();
        Ok(DMatrix::<f64>::identity(n, n) - pinv * &self.matrix)
    }

    /// Computes the joint velocities required to achieve a desired end-effector twist,
    /// using the damped least squares pseudo-inverse.
    pub fn velocities_from_vector(&self, desired_twist: &Vector6<f64>, damping: f64)
                                  -> Result<DVector<f64>, ControlError> {
        let pinv = self.damped_pseudo_inverse(damping)?;
        Ok(pinv * desired_twist)
    }

    fn check_joint_vector(&self, len: usize) -> Result<(), ControlError> {
        if len != self.dof() {
            return Err(ControlError::SingularConfiguration(
                format!("{} joint values for a Jacobian with {} columns", len, self.dof())));
        }
        Ok(())
    }
}

/// Skew symmetric matrix such that `skew(a) * b == a x b`.
pub fn skew(w: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -w.z, w.y,
        w.z, 0.0, -w.x,
        -w.y, w.x, 0.0,
    )
}

/// Velocity transform that maps a twist expressed in the joint frame into the twist of the
/// end effector origin, expressed in the end effector frame:
///
/// ```text
/// | R   -R S(t) |
/// | 0    R      |
/// ```
/// `R` is the rotation of `ee_t_joint`, `t` the position of the end effector in the
/// joint frame.
pub fn velocity_transform(ee_t_joint: &Transform) -> Matrix6<f64> {
    let r = ee_t_joint.rotation.to_rotation_matrix().into_inner();
    let t = ee_t_joint.inverse().translation.vector;
    let mut v = Matrix6::zeros();
    v.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    v.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-r * skew(&t)));
    v.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    v
}

/// Function to compute the Jacobian matrix from joint-aligned frames.
///
/// Each column is the last column of the velocity transform of its joint (rotation about
/// the local Z axis, which is the single degree of freedom of the joint). Joints that do
/// not carry the end effector produce zero columns.
pub fn compute_jacobian(joint_frames: &[JointFrame], end_effector: &Transform) -> DMatrix<f64> {
    let ee_inverse = end_effector.inverse();

    let columns: Vec<Vector6<f64>> = joint_frames.par_iter().map(|joint| {
        if !joint.drives_end_effector {
            return Vector6::zeros();
        }
        let ee_t_joint = ee_inverse * joint.frame;
        velocity_transform(&ee_t_joint).column(5).into_owned()
    }).collect();

    let mut jacobian = DMatrix::zeros(6, columns.len());
    for (i, column) in columns.iter().enumerate() {
        jacobian.column_mut(i).copy_from(column);
    }
    jacobian
}
