use std::ops::Mul;

use crate::matrix::Matrix3;

/// Coordinate axis of a 3D rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Axis> {
        Axis::ALL.get(index).copied()
    }
}

/// 4x4 homogeneous matrix for 3D transforms, applied as `p' = M * p` with
/// `p = (x, y, z, 1)`. Builders compose in call order like [`Matrix3`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    pub coeff: [[f64; 4]; 4],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        coeff: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub const fn new(coeff: [[f64; 4]; 4]) -> Self {
        Self { coeff }
    }

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Matrix product `self * rhs`
    pub fn multiply(&self, rhs: &Matrix4) -> Matrix4 {
        let mut coeff = [[0.0; 4]; 4];
        for (i, row) in coeff.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.coeff[i][k] * rhs.coeff[k][j]).sum();
            }
        }
        Matrix4 { coeff }
    }

    /// Apply `next` after `self`.
    pub fn then(&self, next: &Matrix4) -> Matrix4 {
        next.multiply(self)
    }

    pub fn translate(&self, dx: f64, dy: f64, dz: f64) -> Matrix4 {
        let mut t = Matrix4::IDENTITY;
        t.coeff[0][3] = dx;
        t.coeff[1][3] = dy;
        t.coeff[2][3] = dz;
        self.then(&t)
    }

    pub fn scale(&self, sx: f64, sy: f64, sz: f64) -> Matrix4 {
        let mut s = Matrix4::IDENTITY;
        s.coeff[0][0] = sx;
        s.coeff[1][1] = sy;
        s.coeff[2][2] = sz;
        self.then(&s)
    }

    /// Right-handed rotation by `angle` radians about one axis.
    pub fn rotate_axis(&self, axis: Axis, angle: f64) -> Matrix4 {
        let (sin, cos) = angle.sin_cos();
        let i = (axis.index() + 1) % 3;
        let j = (axis.index() + 2) % 3;

        let mut r = Matrix4::IDENTITY;
        r.coeff[i][i] = cos;
        r.coeff[i][j] = -sin;
        r.coeff[j][i] = sin;
        r.coeff[j][j] = cos;
        self.then(&r)
    }

    /// Map a point, dividing by the homogeneous coordinate. A zero `w` is
    /// treated as 1.
    pub fn transform_point(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let c = &self.coeff;
        let p = [x, y, z, 1.0];
        let row = |i: usize| -> f64 { (0..4).map(|k| c[i][k] * p[k]).sum() };
        let w = row(3);
        let w = if w == 0.0 { 1.0 } else { 1.0 / w };
        (row(0) * w, row(1) * w, row(2) * w)
    }

    /// Project to a 2D matrix acting on the `z = 0` plane by dropping the z
    /// row and column.
    pub fn to_matrix3(&self) -> Matrix3 {
        const KEEP: [usize; 3] = [0, 1, 3];
        let mut coeff = [[0.0; 3]; 3];
        for (i, &src_row) in KEEP.iter().enumerate() {
            for (j, &src_col) in KEEP.iter().enumerate() {
                coeff[i][j] = self.coeff[src_row][src_col];
            }
        }
        Matrix3::new(coeff)
    }

    pub fn approx_eq(&self, other: &Matrix4, epsilon: f64) -> bool {
        self.coeff
            .iter()
            .flatten()
            .zip(other.coeff.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        self.multiply(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: (f64, f64, f64), b: (f64, f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9 && (a.2 - b.2).abs() < 1e-9
    }

    #[test]
    fn test_axis_rotations_are_right_handed() {
        let x = Matrix4::identity().rotate_axis(Axis::X, FRAC_PI_2);
        assert!(close(x.transform_point(0.0, 1.0, 0.0), (0.0, 0.0, 1.0)));

        let y = Matrix4::identity().rotate_axis(Axis::Y, FRAC_PI_2);
        assert!(close(y.transform_point(0.0, 0.0, 1.0), (1.0, 0.0, 0.0)));

        let z = Matrix4::identity().rotate_axis(Axis::Z, FRAC_PI_2);
        assert!(close(z.transform_point(1.0, 0.0, 0.0), (0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_translate_then_scale() {
        let m = Matrix4::identity()
            .translate(1.0, 2.0, 3.0)
            .scale(2.0, 2.0, 2.0);
        assert!(close(m.transform_point(0.0, 0.0, 0.0), (2.0, 4.0, 6.0)));
    }

    #[test]
    fn test_to_matrix3_matches_z_rotation() {
        let m4 = Matrix4::identity()
            .rotate_axis(Axis::Z, 0.4)
            .translate(3.0, -2.0, 7.0);
        let m3 = Matrix3::identity().rotate(0.4).translate(3.0, -2.0);
        assert!(m4.to_matrix3().approx_eq(&m3, 1e-12));
    }
}
