use eight_point::{EightPoint, PixelMatch};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use sample_consensus::{Estimator, Model};

const SAMPLE_POINTS: usize = 16;
const RESIDUAL_THRESHOLD: f64 = 1e-3;
const ROUNDS: usize = 100;

const ROT_MAGNITUDE: f64 = 0.1;
const POINT_BOX_SIZE: f64 = 2.0;
const POINT_DISTANCE: f64 = 4.0;

#[rustfmt::skip]
fn intrinsics() -> Matrix3<f64> {
    Matrix3::new(
        800.0, 0.0,   320.0,
        0.0,   780.0, 240.0,
        0.0,   0.0,   1.0,
    )
}

#[test]
fn randomized() {
    let mut rng = Pcg64::seed_from_u64(0);
    let successes = (0..ROUNDS).filter(|_| run_round(&mut rng)).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 90);
}

#[test]
fn estimator_minimum_samples() {
    assert_eq!(<EightPoint as Estimator<PixelMatch>>::MIN_SAMPLES, 8);
}

#[test]
fn too_few_matches() {
    let mut rng = Pcg64::seed_from_u64(1);
    let matches = some_test_data(&mut rng);
    let eight_point = EightPoint::new(intrinsics()).unwrap();
    assert!(eight_point
        .from_matches(matches.iter().copied().take(7))
        .is_none());
}

fn run_round(rng: &mut Pcg64) -> bool {
    let matches = some_test_data(rng);
    let eight_point = EightPoint::new(intrinsics()).unwrap();
    let essential = match eight_point.estimate(matches.iter().copied()) {
        Some(essential) => essential,
        None => {
            eprintln!("didn't get any essential matrix");
            return false;
        }
    };
    matches.iter().all(|m| {
        let residual = essential.residual(m);
        if residual > RESIDUAL_THRESHOLD {
            eprintln!("failed residual check: {}", residual);
        }
        residual <= RESIDUAL_THRESHOLD
    })
}

/// Projects random points in front of two cameras related by a random relative pose.
fn some_test_data(rng: &mut Pcg64) -> Vec<PixelMatch> {
    let mut random_vector = |magnitude: f64| {
        Vector3::new(
            rng.gen_range(-magnitude..magnitude),
            rng.gen_range(-magnitude..magnitude),
            rng.gen_range(-magnitude..magnitude),
        )
    };
    let rotation = Rotation3::new(random_vector(std::f64::consts::PI * ROT_MAGNITUDE));
    let translation = random_vector(1.0);
    let points: Vec<Point3<f64>> = (0..SAMPLE_POINTS)
        .map(|_| {
            let mut p = Point3::from(random_vector(0.5 * POINT_BOX_SIZE));
            p.z += POINT_DISTANCE;
            p
        })
        .collect();

    let k = intrinsics();
    let project = |p: Point3<f64>| -> Point2<f64> {
        Point2::from_homogeneous(k * p.coords).expect("point is in front of the camera")
    };
    points
        .into_iter()
        .map(|a| {
            let b = rotation * a + translation;
            [project(a), project(b)]
        })
        .collect()
}
