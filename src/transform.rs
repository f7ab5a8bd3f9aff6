//! Rigid transforms: composition, inversion and conversions between homogeneous matrices,
//! translation + rotation components and the angle-axis representation.
//!
//! Transforms are `nalgebra::Isometry3<f64>`, so the rotation part is always a proper
//! rotation (orthonormal, determinant +1) and the inverse is exact. Homogeneous 4x4
//! matrices coming from outside are validated by [from_matrix] before they are accepted.

extern crate nalgebra as na;

use na::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use crate::control_error::ControlError;

/// Rigid body pose (rotation + translation). Composition `a * b` reads as
/// "`b` expressed in the frame `a`".
/// ```
/// extern crate nalgebra as na;
/// use na::{Translation3, UnitQuaternion, Vector3};
/// use rs_cartesian_control::transform::Transform;
///
/// let t = Transform::from_parts(
///     Translation3::new(1.0, 0.0, 0.0),
///     UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5));
/// ```
pub type Transform = Isometry3<f64>;

/// Tolerance for the eigenvalue 1 when extracting the rotation axis.
pub const EIGEN_TOLERANCE: f64 = 1e-8;

/// Tolerance used when validating externally provided rotation blocks.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Matrix product a * b
pub fn compose(a: &Transform, b: &Transform) -> Transform {
    a * b
}

/// Exact inverse
pub fn invert(t: &Transform) -> Transform {
    t.inverse()
}

pub fn from_translation_rotation(t: &Vector3<f64>, r: &Rotation3<f64>) -> Transform {
    Isometry3::from_parts(Translation3::from(*t), UnitQuaternion::from_rotation_matrix(r))
}

pub fn translation_of(t: &Transform) -> Vector3<f64> {
    t.translation.vector
}

pub fn rotation_of(t: &Transform) -> Rotation3<f64> {
    t.rotation.to_rotation_matrix()
}

/// Pure rotation by `angle` about `axis` (the axis passes through the origin).
pub fn rotation_about(axis: &Unit<Vector3<f64>>, angle: f64) -> Transform {
    Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(axis, angle))
}

/// Joint origin as found in robot descriptions: translation `xyz` and fixed axis
/// roll, pitch, yaw (applied about X, then Y, then Z of the parent frame).
pub fn from_origin_rpy(xyz: [f64; 3], rpy: [f64; 3]) -> Transform {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Homogeneous 4x4 representation.
pub fn to_matrix(t: &Transform) -> Matrix4<f64> {
    t.to_homogeneous()
}

/// Accepts a homogeneous 4x4 matrix if its rotation block is a proper rotation
/// and the bottom row is [0, 0, 0, 1].
pub fn from_matrix(m: &Matrix4<f64>) -> Result<Transform, ControlError> {
    let bottom = m.fixed_view::<1, 4>(3, 0);
    if (bottom[0].abs() + bottom[1].abs() + bottom[2].abs() + (bottom[3] - 1.0).abs())
        > ORTHONORMAL_TOLERANCE
    {
        return Err(ControlError::DegenerateRotation(format!(
            "bottom row of homogeneous matrix is {:?}", bottom.iter().collect::<Vec<_>>()
        )));
    }
    let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let deviation = (r.transpose() * r - Matrix3::identity()).norm();
    if deviation > ORTHONORMAL_TOLERANCE || r.determinant() <= 0.0 {
        return Err(ControlError::DegenerateRotation(format!(
            "rotation block is not a proper rotation (orthonormality deviation {:e}, determinant {})",
            deviation, r.determinant()
        )));
    }
    let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    Ok(from_translation_rotation(&translation, &Rotation3::from_matrix_unchecked(r)))
}

/// Angle-axis representation of the rotation contained in the transform.
/// The result is only defined up to the sign: (angle, axis) and (-angle, -axis) describe
/// the same rotation, while `angle * axis` is the same for both.
pub fn rotation_angle_axis(t: &Transform) -> Result<(f64, Unit<Vector3<f64>>), ControlError> {
    angle_axis_of_matrix(t.rotation.to_rotation_matrix().matrix())
}

/// Angle-axis extraction from a raw 3x3 rotation block.
///
/// The axis is the unit eigenvector for the eigenvalue 1, found as the null vector of
/// `R - I`. The cosine comes from the trace and the sine from the component of the axis
/// with the largest magnitude.
pub fn angle_axis_of_matrix(r: &Matrix3<f64>) -> Result<(f64, Unit<Vector3<f64>>), ControlError> {
    if !r.iter().all(|x| x.is_finite()) {
        return Err(ControlError::DegenerateRotation("rotation block is not finite".into()));
    }
    let shifted = r - Matrix3::identity();
    let svd = shifted.svd(false, true);
    let v_t = svd.v_t.ok_or_else(||
        ControlError::DegenerateRotation("singular value decomposition failed".into()))?;

    let (smallest, sigma) = svd.singular_values.iter().enumerate()
        .fold((0, f64::INFINITY), |best, (i, &s)| if s < best.1 { (i, s) } else { best });
    if sigma > EIGEN_TOLERANCE {
        return Err(ControlError::DegenerateRotation(format!(
            "no unit eigenvector corresponding to eigenvalue 1 (closest miss {:e})", sigma
        )));
    }
    let axis = Unit::new_normalize(v_t.row(smallest).transpose());

    let cos_a = (r.trace() - 1.0) / 2.0;
    let (x, y, z) = (axis.x, axis.y, axis.z);
    let sin_a = if z.abs() >= x.abs() && z.abs() >= y.abs() {
        (r[(1, 0)] + (cos_a - 1.0) * x * y) / z
    } else if y.abs() >= x.abs() {
        (r[(0, 2)] + (cos_a - 1.0) * x * z) / y
    } else {
        (r[(2, 1)] + (cos_a - 1.0) * y * z) / x
    };

    Ok((sin_a.atan2(cos_a), axis))
}

/// Rotation that maps the canonical Z axis onto the given unit axis, using the minimal
/// rotation about `Z x axis`.
pub fn align_with_z(axis: &Unit<Vector3<f64>>) -> Transform {
    let z = Vector3::z();
    let dot = z.dot(axis);
    if dot >= 1.0 - 1e-12 {
        return Transform::identity();
    }
    if dot <= -1.0 + 1e-12 {
        // Any axis perpendicular to Z works here.
        return rotation_about(&Vector3::x_axis(), std::f64::consts::PI);
    }
    let rotation_axis = Unit::new_normalize(z.cross(axis));
    rotation_about(&rotation_axis, dot.clamp(-1.0, 1.0).acos())
}
