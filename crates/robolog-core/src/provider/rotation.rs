//! Base orientation conversion

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion};

/// Rotation matrix from roll, pitch and yaw (radians, applied as
/// `Rz(yaw) * Ry(pitch) * Rx(roll)`)
pub fn rpy_to_matrix(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    Rotation3::from_euler_angles(roll, pitch, yaw).into_inner()
}

/// Rotation matrix from a quaternion stored as `[x, y, z, w]`.
/// The quaternion is normalized first.
pub fn xyzw_to_matrix(x: f64, y: f64, z: f64, w: f64) -> Matrix3<f64> {
    let q = Quaternion::new(w, x, y, z);
    if q.norm() == 0.0 {
        return Matrix3::identity();
    }
    UnitQuaternion::from_quaternion(q)
        .to_rotation_matrix()
        .into_inner()
}

/// Rotation matrix from an orientation sample: 3 values are roll-pitch-yaw,
/// 4 values are an XYZW quaternion. Any other length is rejected.
pub fn orientation_to_matrix(values: &[f64]) -> Option<Matrix3<f64>> {
    match *values {
        [roll, pitch, yaw] => Some(rpy_to_matrix(roll, pitch, yaw)),
        [x, y, z, w] => Some(xyzw_to_matrix(x, y, z, w)),
        _ => None,
    }
}
