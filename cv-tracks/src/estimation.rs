use arrsac::Arrsac;
use eight_point::EightPoint;
use four_point::FourPoint;
use log::debug;
use nalgebra::{Matrix3, Point2};
use rand::{RngCore, SeedableRng};
use sample_consensus::{Consensus, Estimator};

/// One flag per match, `true` for inliers.
pub type InlierMask = Vec<bool>;

/// Robustly fits the two competing two-view models to aligned pixel coordinates.
///
/// `a[i]` and `b[i]` are the pixel positions of the two endpoints of match `i`.
/// Either method returns `None` when no model could be fit, which the verifier
/// treats as zero inliers.
pub trait TwoViewEstimator {
    fn homography_inliers(&mut self, a: &[Point2<f64>], b: &[Point2<f64>]) -> Option<InlierMask>;

    fn essential_inliers(
        &mut self,
        a: &[Point2<f64>],
        b: &[Point2<f64>],
        intrinsics: &Matrix3<f64>,
    ) -> Option<InlierMask>;
}

/// Runs ARRSAC with the four-point and eight-point estimators.
pub struct ArrsacEstimator<R: RngCore> {
    homography: Arrsac<R>,
    essential: Arrsac<R>,
    four_point: FourPoint,
}

impl<R> ArrsacEstimator<R>
where
    R: RngCore + SeedableRng,
{
    /// `homography_threshold` is a transfer error and `essential_threshold` a Sampson distance, both in pixels.
    pub fn new(homography_threshold: f64, essential_threshold: f64, seed: u64) -> Self {
        Self {
            homography: Arrsac::new(homography_threshold, R::seed_from_u64(seed)),
            essential: Arrsac::new(essential_threshold, R::seed_from_u64(seed.wrapping_add(1))),
            four_point: FourPoint::new(),
        }
    }
}

impl<R> TwoViewEstimator for ArrsacEstimator<R>
where
    R: RngCore,
{
    fn homography_inliers(&mut self, a: &[Point2<f64>], b: &[Point2<f64>]) -> Option<InlierMask> {
        if a.len() < <FourPoint as Estimator<four_point::PixelMatch>>::MIN_SAMPLES {
            return None;
        }
        let matches = a.iter().zip(b).map(|(&a, &b)| [a, b]);
        let (_, inliers) = self.homography.model_inliers(&self.four_point, matches)?;
        debug!("homography kept {} of {} matches", inliers.len(), a.len());
        Some(to_mask(a.len(), &inliers))
    }

    fn essential_inliers(
        &mut self,
        a: &[Point2<f64>],
        b: &[Point2<f64>],
        intrinsics: &Matrix3<f64>,
    ) -> Option<InlierMask> {
        if a.len() < <EightPoint as Estimator<eight_point::PixelMatch>>::MIN_SAMPLES {
            return None;
        }
        let eight_point = EightPoint::new(*intrinsics)?;
        let matches = a.iter().zip(b).map(|(&a, &b)| [a, b]);
        let (_, inliers) = self.essential.model_inliers(&eight_point, matches)?;
        debug!("essential matrix kept {} of {} matches", inliers.len(), a.len());
        Some(to_mask(a.len(), &inliers))
    }
}

fn to_mask(len: usize, inliers: &[usize]) -> InlierMask {
    let mut mask = vec![false; len];
    for &inlier in inliers {
        mask[inlier] = true;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg64;

    #[test]
    fn mask_marks_inliers() {
        assert_eq!(to_mask(4, &[0, 2]), vec![true, false, true, false]);
    }

    #[test]
    fn too_few_points_fit_nothing() {
        let mut estimator = ArrsacEstimator::<Pcg64>::new(3.0, 1.0, 0);
        let points = vec![Point2::new(1.0, 2.0); 7];
        assert!(estimator
            .homography_inliers(&points[..3], &points[..3])
            .is_none());
        assert!(estimator
            .essential_inliers(&points, &points, &Matrix3::identity())
            .is_none());
    }

    #[test]
    fn pure_translation_is_a_homography() {
        let mut estimator = ArrsacEstimator::<Pcg64>::new(3.0, 1.0, 0);
        let a: Vec<Point2<f64>> = (0..40)
            .map(|i| {
                let x = (i % 8) as f64 * 40.0 + 13.0;
                let y = (i / 8) as f64 * 50.0 + (i * i % 7) as f64;
                Point2::new(x, y)
            })
            .collect();
        let mut b: Vec<Point2<f64>> = a
            .iter()
            .map(|p| Point2::new(p.x + 5.0, p.y - 3.0))
            .collect();
        // Two gross outliers.
        b[3] = Point2::new(600.0, 10.0);
        b[17] = Point2::new(2.0, 400.0);
        let mask = estimator.homography_inliers(&a, &b).expect("expected a homography");
        assert_eq!(mask.len(), 40);
        assert!(!mask[3] && !mask[17]);
        assert_eq!(mask.iter().filter(|&&inlier| inlier).count(), 38);
    }
}
