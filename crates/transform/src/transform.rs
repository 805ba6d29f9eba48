//! Matrices for the standard 2D editing transforms

use std::f64::consts::{FRAC_PI_2, PI};

use crate::matrix::Matrix3;

/// Direction of a flip or shear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
    Unknown,
}

/// Fixed rotation by a multiple of a quarter turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationType {
    Degrees90,
    Degrees180,
    Degrees270,
}

impl RotationType {
    /// Rotation angle in radians
    pub fn angle(self) -> f64 {
        match self {
            RotationType::Degrees90 => FRAC_PI_2,
            RotationType::Degrees180 => PI,
            RotationType::Degrees270 => -FRAC_PI_2,
        }
    }
}

/// Mirror across the vertical (horizontal flip) or horizontal (vertical flip)
/// line through `axis`. `Unknown` yields the identity.
pub fn flip(orientation: Orientation, axis: f64) -> Matrix3 {
    let m = Matrix3::identity();
    match orientation {
        Orientation::Horizontal => m.translate(-axis, 0.0).scale(-1.0, 1.0).translate(axis, 0.0),
        Orientation::Vertical => m.translate(0.0, -axis).scale(1.0, -1.0).translate(0.0, axis),
        Orientation::Unknown => m,
    }
}

/// Mirror across the line through `(x1, y1)` and `(x2, y2)`.
pub fn flip_free(x1: f64, y1: f64, x2: f64, y2: f64) -> Matrix3 {
    let angle = (y2 - y1).atan2(x2 - x1);
    Matrix3::identity()
        .translate(-x1, -y1)
        .rotate(-angle)
        .scale(1.0, -1.0)
        .rotate(angle)
        .translate(x1, y1)
}

/// Rotate by a fixed quarter-turn multiple about `(center_x, center_y)`.
pub fn rotate(rotation: RotationType, center_x: f64, center_y: f64) -> Matrix3 {
    rotate_center(center_x, center_y, rotation.angle())
}

/// Rotate by `angle` radians about `(center_x, center_y)`.
pub fn rotate_center(center_x: f64, center_y: f64, angle: f64) -> Matrix3 {
    Matrix3::identity()
        .translate(-center_x, -center_y)
        .rotate(angle)
        .translate(center_x, center_y)
}

/// Rotate by `angle` radians about the center of a rectangle.
pub fn rotate_rect(x: f64, y: f64, width: f64, height: f64, angle: f64) -> Matrix3 {
    rotate_center(x + width / 2.0, y + height / 2.0, angle)
}

/// Map the rectangle `(x1, y1)-(x2, y2)` onto `(tx1, ty1)-(tx2, ty2)`.
///
/// An axis whose source extent is not positive keeps a scale factor of 1.
#[allow(clippy::too_many_arguments)]
pub fn scale_to_rect(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    tx1: f64,
    ty1: f64,
    tx2: f64,
    ty2: f64,
) -> Matrix3 {
    let scale_x = if x2 - x1 > 0.0 { (tx2 - tx1) / (x2 - x1) } else { 1.0 };
    let scale_y = if y2 - y1 > 0.0 { (ty2 - ty1) / (y2 - y1) } else { 1.0 };

    Matrix3::identity()
        .translate(-x1, -y1)
        .scale(scale_x, scale_y)
        .translate(tx1, ty1)
}

/// Shear the rectangle `(x1, y1)-(x2, y2)` about its center.
///
/// `amount` is the displacement in pixels of the rectangle's far edge: a
/// horizontal shear moves the bottom edge right by `amount / 2` and the top
/// edge left by the same. Any orientation other than horizontal shears
/// vertically. Zero sizes are treated as 1.
pub fn shear(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    orientation: Orientation,
    amount: f64,
) -> Matrix3 {
    let width = match x2 - x1 {
        w if w == 0.0 => 1.0,
        w => w,
    };
    let height = match y2 - y1 {
        h if h == 0.0 => 1.0,
        h => h,
    };
    let center_x = (x1 + x2) / 2.0;
    let center_y = (y1 + y2) / 2.0;

    let m = Matrix3::identity().translate(-center_x, -center_y);
    let m = match orientation {
        Orientation::Horizontal => m.xshear(amount / height),
        Orientation::Vertical | Orientation::Unknown => m.yshear(amount / width),
    };
    m.translate(center_x, center_y)
}

/// Projective map taking the rectangle `(x1, y1)-(x2, y2)` to the quad
/// `targets`, given as top-left, top-right, bottom-left, bottom-right.
///
/// When the quad is a parallelogram the result is affine. A degenerate quad
/// does not fail: a zero determinant sets the perspective coefficients to 1.
pub fn perspective_fit_4_points(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    targets: [(f64, f64); 4],
) -> Matrix3 {
    let scale_x = if x2 - x1 > 0.0 { 1.0 / (x2 - x1) } else { 1.0 };
    let scale_y = if y2 - y1 > 0.0 { 1.0 / (y2 - y1) } else { 1.0 };
    let to_unit = Matrix3::identity()
        .translate(-x1, -y1)
        .scale(scale_x, scale_y);

    let [(tx1, ty1), (tx2, ty2), (tx3, ty3), (tx4, ty4)] = targets;

    let dx1 = tx2 - tx4;
    let dx2 = tx3 - tx4;
    let dx3 = tx1 - tx2 + tx4 - tx3;

    let dy1 = ty2 - ty4;
    let dy2 = ty3 - ty4;
    let dy3 = ty1 - ty2 + ty4 - ty3;

    let unit_to_quad = if dx3 == 0.0 && dy3 == 0.0 {
        Matrix3::new([
            [tx2 - tx1, tx4 - tx2, tx1],
            [ty2 - ty1, ty4 - ty2, ty1],
            [0.0, 0.0, 1.0],
        ])
    } else {
        let det = dx1 * dy2 - dy1 * dx2;
        let (c20, c21) = if det == 0.0 {
            (1.0, 1.0)
        } else {
            (
                (dx3 * dy2 - dy3 * dx2) / det,
                (dx1 * dy3 - dy1 * dx3) / det,
            )
        };

        Matrix3::new([
            [tx2 - tx1 + c20 * tx2, tx3 - tx1 + c21 * tx3, tx1],
            [ty2 - ty1 + c20 * ty2, ty3 - ty1 + c21 * ty3, ty1],
            [c20, c21, 1.0],
        ])
    };

    to_unit.then(&unit_to_quad)
}

/// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` of the rectangle
/// `(x1, y1)-(x2, y2)` after transforming its corners.
pub fn transform_bounds(
    matrix: &Matrix3,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
) -> (f64, f64, f64, f64) {
    [(x1, y1), (x2, y1), (x1, y2), (x2, y2)]
        .into_iter()
        .map(|(x, y)| matrix.transform_point(x, y))
        .fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), (x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_horizontal_flip_about_axis() {
        let m = flip(Orientation::Horizontal, 50.0);
        assert!(close(m.transform_point(10.0, 0.0), (90.0, 0.0)));

        let twice = m.then(&m);
        assert!(close(twice.transform_point(10.0, 0.0), (10.0, 0.0)));
        assert!(twice.is_identity());
    }

    #[test]
    fn test_vertical_and_unknown_flip() {
        let m = flip(Orientation::Vertical, 20.0);
        assert!(close(m.transform_point(3.0, 5.0), (3.0, 35.0)));
        assert!(flip(Orientation::Unknown, 20.0).is_identity());
    }

    #[test]
    fn test_flip_free_across_diagonal() {
        let m = flip_free(0.0, 0.0, 1.0, 1.0);
        assert!(close(m.transform_point(2.0, 0.0), (0.0, 2.0)));
        // Points on the line stay put.
        assert!(close(m.transform_point(4.0, 4.0), (4.0, 4.0)));

        let horizontal = flip_free(0.0, 10.0, 5.0, 10.0);
        assert!(horizontal.approx_eq(&flip(Orientation::Vertical, 10.0), 1e-9));
    }

    #[test]
    fn test_fixed_rotations() {
        let m = rotate(RotationType::Degrees90, 0.0, 0.0);
        assert!(close(m.transform_point(1.0, 0.0), (0.0, 1.0)));
        assert!(m.is_simple());

        let m = rotate(RotationType::Degrees180, 5.0, 5.0);
        assert!(close(m.transform_point(0.0, 0.0), (10.0, 10.0)));

        let m = rotate(RotationType::Degrees270, 0.0, 0.0)
            .then(&rotate(RotationType::Degrees90, 0.0, 0.0));
        assert!(m.is_identity());
    }

    #[test]
    fn test_rotate_rect_uses_center() {
        let m = rotate_rect(0.0, 0.0, 10.0, 20.0, 1.1);
        assert!(close(m.transform_point(5.0, 10.0), (5.0, 10.0)));
    }

    #[test]
    fn test_scale_to_rect() {
        let m = scale_to_rect(0.0, 0.0, 10.0, 20.0, 100.0, 100.0, 120.0, 110.0);
        assert!(close(m.transform_point(0.0, 0.0), (100.0, 100.0)));
        assert!(close(m.transform_point(10.0, 20.0), (120.0, 110.0)));

        // Zero-width source keeps scale 1 on that axis.
        let m = scale_to_rect(4.0, 0.0, 4.0, 10.0, 0.0, 0.0, 50.0, 20.0);
        assert!(close(m.transform_point(5.0, 10.0), (1.0, 20.0)));
    }

    #[test]
    fn test_shear_about_center() {
        let m = shear(0.0, 0.0, 10.0, 10.0, Orientation::Horizontal, 4.0);
        assert!(close(m.transform_point(5.0, 5.0), (5.0, 5.0)));
        assert!(close(m.transform_point(0.0, 10.0), (2.0, 10.0)));
        assert!(close(m.transform_point(0.0, 0.0), (-2.0, 0.0)));

        let m = shear(0.0, 0.0, 10.0, 10.0, Orientation::Vertical, 4.0);
        assert!(close(m.transform_point(10.0, 0.0), (10.0, 2.0)));
        let unknown = shear(0.0, 0.0, 10.0, 10.0, Orientation::Unknown, 4.0);
        assert!(unknown.approx_eq(&m, 1e-15));

        // Degenerate height is clamped instead of dividing by zero.
        let m = shear(0.0, 3.0, 10.0, 3.0, Orientation::Horizontal, 2.0);
        assert!(m.coeff.iter().flatten().all(|c| c.is_finite()));
    }

    #[test]
    fn test_perspective_fit_affine_case_equals_scale() {
        let targets = [(10.0, 20.0), (50.0, 20.0), (10.0, 80.0), (50.0, 80.0)];
        let fit = perspective_fit_4_points(0.0, 0.0, 100.0, 100.0, targets);
        let scaled = scale_to_rect(0.0, 0.0, 100.0, 100.0, 10.0, 20.0, 50.0, 80.0);
        assert!(fit.is_affine());
        assert!(fit.approx_eq(&scaled, 1e-9), "{:?} vs {:?}", fit, scaled);
    }

    #[test]
    fn test_perspective_fit_hits_corners() {
        let targets = [(0.0, 0.0), (100.0, 10.0), (-5.0, 90.0), (120.0, 130.0)];
        let m = perspective_fit_4_points(10.0, 10.0, 60.0, 40.0, targets);
        assert!(!m.is_affine());

        let corners = [(10.0, 10.0), (60.0, 10.0), (10.0, 40.0), (60.0, 40.0)];
        for ((x, y), expected) in corners.into_iter().zip(targets) {
            assert!(
                close(m.transform_point(x, y), expected),
                "corner ({}, {}) -> {:?}, expected {:?}",
                x,
                y,
                m.transform_point(x, y),
                expected
            );
        }
    }

    #[test]
    fn test_perspective_fit_degenerate_quad_is_finite() {
        // All four targets on one line: zero determinant.
        let targets = [(0.0, 0.0), (1.0, 1.0), (3.0, 3.0), (2.0, 2.0)];
        let m = perspective_fit_4_points(0.0, 0.0, 1.0, 1.0, targets);
        assert_eq!(m.coeff[2][0], 1.0);
        assert_eq!(m.coeff[2][1], 1.0);
    }

    #[test]
    fn test_transform_bounds() {
        let m = rotate_center(0.0, 0.0, std::f64::consts::FRAC_PI_4);
        let (min_x, min_y, max_x, max_y) = transform_bounds(&m, -1.0, -1.0, 1.0, 1.0);
        let r = std::f64::consts::SQRT_2;
        assert!((min_x + r).abs() < 1e-9 && (max_x - r).abs() < 1e-9);
        assert!((min_y + r).abs() < 1e-9 && (max_y - r).abs() < 1e-9);
    }
}
