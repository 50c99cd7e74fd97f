use four_point::{FourPoint, Homography, PixelMatch};
use nalgebra::{Matrix3, Point2};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use sample_consensus::{Estimator, Model};

const SAMPLE_POINTS: usize = 20;
const RESIDUAL_THRESHOLD: f64 = 1e-6;
const ROUNDS: usize = 100;

#[test]
fn randomized() {
    let mut rng = Pcg64::seed_from_u64(0);
    let successes = (0..ROUNDS).filter(|_| run_round(&mut rng)).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 95);
}

#[test]
fn estimator_minimum_samples() {
    assert_eq!(<FourPoint as Estimator<PixelMatch>>::MIN_SAMPLES, 4);
}

fn run_round(rng: &mut Pcg64) -> bool {
    let (real, matches) = some_test_data(rng);
    let estimate = match FourPoint::new().estimate(matches.iter().copied()) {
        Some(estimate) => estimate,
        None => {
            eprintln!("no homography for {:?}", real);
            return false;
        }
    };
    matches.iter().all(|m| {
        let residual = estimate.residual(m);
        if residual > RESIDUAL_THRESHOLD {
            eprintln!("failed residual check: {}", residual);
        }
        residual <= RESIDUAL_THRESHOLD
    })
}

/// Gets a random homography close to identity and matches in a 640x480 image that obey it.
fn some_test_data(rng: &mut Pcg64) -> (Homography, Vec<PixelMatch>) {
    #[rustfmt::skip]
    let real = Homography(Matrix3::new(
        1.0 + rng.gen_range(-0.1..0.1), rng.gen_range(-0.1..0.1),       rng.gen_range(-30.0..30.0),
        rng.gen_range(-0.1..0.1),       1.0 + rng.gen_range(-0.1..0.1), rng.gen_range(-30.0..30.0),
        rng.gen_range(-1e-4..1e-4),     rng.gen_range(-1e-4..1e-4),     1.0,
    ));
    let matches = (0..SAMPLE_POINTS)
        .map(|_| {
            let a = Point2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0));
            let b = real.transfer(a).expect("test homography keeps points finite");
            [a, b]
        })
        .collect();
    (real, matches)
}
