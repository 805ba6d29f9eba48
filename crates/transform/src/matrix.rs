use std::ops::Mul;

/// Tolerance used by the approximate predicates
pub const EPSILON: f64 = 1e-6;

/// 3x3 homogeneous matrix for 2D transforms.
///
/// Points are column vectors, so a matrix is applied as `p' = M * p` with
/// `p = (x, y, 1)`:
///
/// ```text
/// [ x' ]   [ c00 c01 c02 ] [ x ]
/// [ y' ] = [ c10 c11 c12 ] [ y ]
/// [ w' ]   [ c20 c21 c22 ] [ 1 ]
/// ```
///
/// The builder methods (`translate`, `scale`, ...) return the matrix with the
/// elementary transform applied *after* it, so a chain reads in the order the
/// transforms happen:
///
/// ```
/// use tessera_transform::Matrix3;
///
/// // Rotate a quarter turn about (10, 10).
/// let m = Matrix3::identity()
///     .translate(-10.0, -10.0)
///     .rotate(std::f64::consts::FRAC_PI_2)
///     .translate(10.0, 10.0);
/// let (x, y) = m.transform_point(20.0, 10.0);
/// assert!((x - 10.0).abs() < 1e-9 && (y - 20.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3 {
    pub coeff: [[f64; 3]; 3],
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3 {
        coeff: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub const fn new(coeff: [[f64; 3]; 3]) -> Self {
        Self { coeff }
    }

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Matrix product `self * rhs`: applies `rhs` first, then `self`.
    pub fn multiply(&self, rhs: &Matrix3) -> Matrix3 {
        let mut coeff = [[0.0; 3]; 3];
        for (i, row) in coeff.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..3).map(|k| self.coeff[i][k] * rhs.coeff[k][j]).sum();
            }
        }
        Matrix3 { coeff }
    }

    /// Apply `next` after `self`.
    pub fn then(&self, next: &Matrix3) -> Matrix3 {
        next.multiply(self)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Matrix3 {
        self.then(&Matrix3::new([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]]))
    }

    pub fn scale(&self, sx: f64, sy: f64) -> Matrix3 {
        self.then(&Matrix3::new([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]]))
    }

    /// Rotate by `theta` radians. With y pointing down this turns clockwise.
    pub fn rotate(&self, theta: f64) -> Matrix3 {
        let (sin, cos) = theta.sin_cos();
        self.then(&Matrix3::new([[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]]))
    }

    /// Shear along x: `x' = x + amount * y`.
    pub fn xshear(&self, amount: f64) -> Matrix3 {
        self.then(&Matrix3::new([[1.0, amount, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]))
    }

    /// Shear along y: `y' = y + amount * x`.
    pub fn yshear(&self, amount: f64) -> Matrix3 {
        self.then(&Matrix3::new([[1.0, 0.0, 0.0], [amount, 1.0, 0.0], [0.0, 0.0, 1.0]]))
    }

    /// Map a point, dividing by the homogeneous coordinate. A zero `w` is
    /// treated as 1.
    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        let c = &self.coeff;
        let w = c[2][0] * x + c[2][1] * y + c[2][2];
        let w = if w == 0.0 { 1.0 } else { 1.0 / w };
        (
            (c[0][0] * x + c[0][1] * y + c[0][2]) * w,
            (c[1][0] * x + c[1][1] * y + c[1][2]) * w,
        )
    }

    pub fn determinant(&self) -> f64 {
        let c = &self.coeff;
        c[0][0] * (c[1][1] * c[2][2] - c[1][2] * c[2][1])
            - c[0][1] * (c[1][0] * c[2][2] - c[1][2] * c[2][0])
            + c[0][2] * (c[1][0] * c[2][1] - c[1][1] * c[2][0])
    }

    /// Inverse matrix, or `None` if the matrix is singular.
    pub fn invert(&self) -> Option<Matrix3> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let c = &self.coeff;
        let inv = 1.0 / det;
        Some(Matrix3::new([
            [
                (c[1][1] * c[2][2] - c[1][2] * c[2][1]) * inv,
                (c[0][2] * c[2][1] - c[0][1] * c[2][2]) * inv,
                (c[0][1] * c[1][2] - c[0][2] * c[1][1]) * inv,
            ],
            [
                (c[1][2] * c[2][0] - c[1][0] * c[2][2]) * inv,
                (c[0][0] * c[2][2] - c[0][2] * c[2][0]) * inv,
                (c[0][2] * c[1][0] - c[0][0] * c[1][2]) * inv,
            ],
            [
                (c[1][0] * c[2][1] - c[1][1] * c[2][0]) * inv,
                (c[0][1] * c[2][0] - c[0][0] * c[2][1]) * inv,
                (c[0][0] * c[1][1] - c[0][1] * c[1][0]) * inv,
            ],
        ]))
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Matrix3::IDENTITY, EPSILON)
    }

    /// Returns true if the bottom row is `[0, 0, 1]`.
    pub fn is_affine(&self) -> bool {
        let c = &self.coeff;
        c[2][0].abs() < EPSILON && c[2][1].abs() < EPSILON && (c[2][2] - 1.0).abs() < EPSILON
    }

    /// Returns true if every off-diagonal coefficient is zero.
    pub fn is_diagonal(&self) -> bool {
        (0..3).all(|i| (0..3).all(|j| i == j || self.coeff[i][j].abs() < EPSILON))
    }

    /// Returns true for affine maps whose linear part only holds 0 and ±1:
    /// translations, flips and quarter turns. Such maps move pixels without
    /// resampling.
    pub fn is_simple(&self) -> bool {
        self.is_affine()
            && self.coeff[..2].iter().all(|row| {
                row[..2].iter().all(|&value| {
                    let abs = value.abs();
                    abs <= EPSILON || (abs - 1.0).abs() <= EPSILON
                })
            })
    }

    pub fn approx_eq(&self, other: &Matrix3, epsilon: f64) -> bool {
        self.coeff
            .iter()
            .flatten()
            .zip(other.coeff.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Mul for Matrix3 {
    type Output = Matrix3;

    fn mul(self, rhs: Matrix3) -> Matrix3 {
        self.multiply(&rhs)
    }
}

impl From<[[f64; 3]; 3]> for Matrix3 {
    fn from(coeff: [[f64; 3]; 3]) -> Self {
        Self { coeff }
    }
}
