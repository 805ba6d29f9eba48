use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_transform::{
    flip, perspective_fit_4_points, rotate_rect, scale_to_rect, transform_bounds, Matrix3,
    Orientation,
};

fn close(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    (a.0 - b.0).abs() < tolerance && (a.1 - b.1).abs() < tolerance
}

#[test]
fn test_flip_scenario() {
    let m = flip(Orientation::Horizontal, 50.0);
    assert!(close(m.transform_point(10.0, 0.0), (90.0, 0.0), 1e-12));
    let back = m.then(&m);
    assert!(close(back.transform_point(10.0, 0.0), (10.0, 0.0), 1e-12));
}

#[test]
fn test_inverse_undoes_perspective_fit() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..100 {
        // Jitter a square's corners so the quad stays convex.
        let mut jitter = || rng.gen_range(-15.0..15.0);
        let targets = [
            (0.0 + jitter(), 0.0 + jitter()),
            (100.0 + jitter(), 0.0 + jitter()),
            (0.0 + jitter(), 100.0 + jitter()),
            (100.0 + jitter(), 100.0 + jitter()),
        ];
        let m = perspective_fit_4_points(0.0, 0.0, 64.0, 64.0, targets);
        let inverse = m.invert().expect("convex quad gives an invertible map");

        for (x, y) in [(0.0, 0.0), (32.0, 10.0), (63.5, 63.5), (12.25, 50.0)] {
            let (tx, ty) = m.transform_point(x, y);
            assert!(close(inverse.transform_point(tx, ty), (x, y), 1e-6));
        }
    }
}

#[test]
fn test_bounds_of_rotated_then_scaled_rect() {
    let m = rotate_rect(0.0, 0.0, 20.0, 10.0, std::f64::consts::FRAC_PI_2)
        .then(&scale_to_rect(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 2.0, 2.0));
    let (x1, y1, x2, y2) = transform_bounds(&m, 0.0, 0.0, 20.0, 10.0);
    // A quarter turn about (10, 5) gives x in [5, 15] and y in [-5, 15].
    assert!(close((x1, y1), (10.0, -10.0), 1e-9));
    assert!(close((x2, y2), (30.0, 30.0), 1e-9));
}

#[test]
fn test_identity_is_neutral_for_then() {
    let m = Matrix3::identity().rotate(0.25).translate(4.0, 2.0).xshear(0.1);
    assert!(Matrix3::identity().then(&m).approx_eq(&m, 1e-15));
    assert!(m.then(&Matrix3::identity()).approx_eq(&m, 1e-15));
}
