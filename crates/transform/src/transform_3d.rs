//! Euler rotations and camera perspective for the 3D transform.
//!
//! Everything is built as a [`Matrix4`] and flattened onto the image plane with
//! [`Matrix4::to_matrix3`] at the end.

use crate::matrix::Matrix3;
use crate::matrix4::{Axis, Matrix4};

/// Order in which the three axis rotations are applied.
///
/// The discriminant encodes the order as `2 * first_axis + reverse`, where a
/// forward order cycles X, Y, Z from the first axis and a reverse order runs
/// the other way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationOrder {
    #[default]
    Xyz = 0,
    Xzy = 1,
    Yzx = 2,
    Yxz = 3,
    Zxy = 4,
    Zyx = 5,
}

impl RotationOrder {
    pub const ALL: [RotationOrder; 6] = [
        RotationOrder::Xyz,
        RotationOrder::Xzy,
        RotationOrder::Yzx,
        RotationOrder::Yxz,
        RotationOrder::Zxy,
        RotationOrder::Zyx,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<RotationOrder> {
        RotationOrder::ALL.get(index).copied()
    }

    pub fn is_reverse(self) -> bool {
        self.index() % 2 == 1
    }

    /// Axes in the order they are applied.
    pub fn to_permutation(self) -> [Axis; 3] {
        let first = self.index() / 2;
        let (step1, step2) = if self.is_reverse() { (2, 1) } else { (1, 2) };
        [first, (first + step1) % 3, (first + step2) % 3].map(|i| Axis::ALL[i])
    }

    /// Inverse of [`to_permutation`](Self::to_permutation). Returns `None`
    /// when the axes are not a permutation of X, Y, Z.
    pub fn from_permutation(permutation: [Axis; 3]) -> Option<RotationOrder> {
        RotationOrder::ALL
            .into_iter()
            .find(|order| order.to_permutation() == permutation)
    }

    /// The order that applies the same axes back to front.
    pub fn reversed(self) -> RotationOrder {
        let [a, b, c] = self.to_permutation();
        // Every permutation of three axes maps to one of the six orders.
        RotationOrder::from_permutation([c, b, a]).unwrap_or(self)
    }
}

/// Rotate by `angles` (x, y, z radians) in `order` about `pivot`.
pub fn matrix4_rotate_euler(order: RotationOrder, angles: [f64; 3], pivot: [f64; 3]) -> Matrix4 {
    let [px, py, pz] = pivot;
    let mut m = Matrix4::identity().translate(-px, -py, -pz);
    for axis in order.to_permutation() {
        m = m.rotate_axis(axis, angles[axis.index()]);
    }
    m.translate(px, py, pz)
}

/// Recover the (x, y, z) angles of a pure rotation composed in `order`.
///
/// The middle angle is taken from an arcsine and so lies in `[-π/2, π/2]`;
/// decoding with a different order than the one used to build the matrix
/// gives other angles.
pub fn decompose_euler(matrix: &Matrix4, order: RotationOrder) -> [f64; 3] {
    let [i, j, k] = order.to_permutation().map(Axis::index);
    let m = &matrix.coeff;
    let mut angles = [0.0; 3];

    if order.is_reverse() {
        angles[j] = m[k][i].clamp(-1.0, 1.0).asin();
        angles[i] = (-m[k][j]).atan2(m[k][k]);
        angles[k] = (-m[j][i]).atan2(m[i][i]);
    } else {
        angles[j] = (-m[k][i]).clamp(-1.0, 1.0).asin();
        angles[i] = m[k][j].atan2(m[k][k]);
        angles[k] = m[j][i].atan2(m[i][i]);
    }

    angles
}

/// Central projection onto the `z = 0` plane for a camera at `camera`.
///
/// A camera on the plane (`z == 0`) has no defined projection and yields the
/// identity.
pub fn matrix4_perspective(camera: [f64; 3]) -> Matrix4 {
    let [cx, cy, cz] = camera;
    if cz == 0.0 {
        return Matrix4::identity();
    }

    let mut projection = Matrix4::IDENTITY;
    projection.coeff[3][2] = -1.0 / cz;

    Matrix4::identity()
        .translate(-cx, -cy, 0.0)
        .then(&projection)
        .translate(cx, cy, 0.0)
}

/// Focal length giving `angle_of_view` radians across the larger image side.
pub fn angle_of_view_to_focal_length(angle_of_view: f64, width: f64, height: f64) -> f64 {
    width.max(height) / (2.0 * (angle_of_view / 2.0).tan())
}

pub fn focal_length_to_angle_of_view(focal_length: f64, width: f64, height: f64) -> f64 {
    2.0 * (width.max(height) / (2.0 * focal_length)).atan()
}

/// Inputs of [`transform_3d_matrix`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform3dParams {
    pub camera: [f64; 3],
    pub offset: [f64; 3],
    pub order: RotationOrder,
    pub angles: [f64; 3],
    pub pivot: [f64; 3],
}

/// Rotate about the pivot, move by the offset and project through the camera.
pub fn transform_3d_matrix(params: &Transform3dParams) -> Matrix3 {
    let [ox, oy, oz] = params.offset;
    matrix4_rotate_euler(params.order, params.angles, params.pivot)
        .translate(ox, oy, oz)
        .then(&matrix4_perspective(params.camera))
        .to_matrix3()
}
