//! Homogeneous matrices for 2D and 3D-assisted image transforms
//!
//! [`Matrix3`] maps image coordinates for scale, rotate, shear, flip and
//! perspective. [`Matrix4`] is used to build rotations and camera
//! projections in 3D before flattening them onto the image plane.
//!
//! None of these functions fail: degenerate input produces a best-effort
//! matrix and non-finite input propagates into the coefficients. Callers
//! that resample pixels should check [`Matrix3::invert`] first.

pub mod matrix;
pub mod matrix4;
pub mod transform;
pub mod transform_3d;

pub use matrix::{Matrix3, EPSILON};
pub use matrix4::{Axis, Matrix4};
pub use transform::{
    flip, flip_free, perspective_fit_4_points, rotate, rotate_center, rotate_rect,
    scale_to_rect, shear, transform_bounds, Orientation, RotationType,
};
pub use transform_3d::{
    angle_of_view_to_focal_length, decompose_euler, focal_length_to_angle_of_view,
    matrix4_perspective, matrix4_rotate_euler, transform_3d_matrix, RotationOrder,
    Transform3dParams,
};
