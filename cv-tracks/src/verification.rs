//! Two-view geometric verification.
//!
//! Both a homography and an essential matrix are fit to the raw matches of an image pair.
//! The model with strictly more inliers is kept if it also has strictly more inliers than
//! the minimum, otherwise the pair is rejected. Ties always reject.

use crate::{FeatureMatch, ImageFeatures, TwoViewEstimator};
use log::info;
use nalgebra::{Matrix3, Point2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Homography,
    Essential,
}

/// Why a pair contributes nothing to the track graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The pair had too few raw matches to attempt a fit.
    TooFewMatches { matches: usize, minimum: usize },
    /// Neither model won the selection with the given inlier counts.
    NoModel { homography: usize, essential: usize },
    /// The selected model kept no matches.
    NoInliers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted {
        model: ModelKind,
        /// The inlier subset of the raw matches in their original order.
        matches: Vec<FeatureMatch>,
    },
    Rejected(Rejection),
}

impl Verification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The verified matches, empty for rejected pairs.
    pub fn matches(&self) -> &[FeatureMatch] {
        match self {
            Self::Accepted { matches, .. } => matches,
            Self::Rejected(_) => &[],
        }
    }
}

/// The model selection policy.
pub fn select_model(homography: usize, essential: usize, minimum: usize) -> Option<ModelKind> {
    if homography > essential && homography > minimum {
        Some(ModelKind::Homography)
    } else if essential > homography && essential > minimum {
        Some(ModelKind::Essential)
    } else {
        None
    }
}

pub struct TwoViewVerifier<E> {
    estimator: E,
    minimum_raw_matches: usize,
    minimum_model_inliers: usize,
}

impl<E> TwoViewVerifier<E>
where
    E: TwoViewEstimator,
{
    pub fn new(estimator: E) -> Self {
        Self {
            estimator,
            minimum_raw_matches: 8,
            minimum_model_inliers: 20,
        }
    }

    pub fn minimum_raw_matches(self, minimum_raw_matches: usize) -> Self {
        Self {
            minimum_raw_matches,
            ..self
        }
    }

    pub fn minimum_model_inliers(self, minimum_model_inliers: usize) -> Self {
        Self {
            minimum_model_inliers,
            ..self
        }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Keeps the matches between `a` and `b` that agree with one two-view geometry.
    ///
    /// `intrinsics` is the working camera matrix both images were undistorted to.
    pub fn verify(
        &mut self,
        a: &ImageFeatures,
        b: &ImageFeatures,
        matches: &[FeatureMatch],
        intrinsics: &Matrix3<f64>,
    ) -> Verification {
        if matches.len() < self.minimum_raw_matches {
            info!(
                "rejecting pair with {} raw matches, at least {} are needed",
                matches.len(),
                self.minimum_raw_matches
            );
            return Verification::Rejected(Rejection::TooFewMatches {
                matches: matches.len(),
                minimum: self.minimum_raw_matches,
            });
        }

        let points_a: Vec<Point2<f64>> = matches.iter().map(|m| a.point(m.query())).collect();
        let points_b: Vec<Point2<f64>> = matches.iter().map(|m| b.point(m.train())).collect();

        let homography = self.estimator.homography_inliers(&points_a, &points_b);
        let essential = self
            .estimator
            .essential_inliers(&points_a, &points_b, intrinsics);
        let count_h = inlier_count(&homography, matches.len());
        let count_e = inlier_count(&essential, matches.len());
        info!(
            "{} raw matches, homography inliers: {}, essential matrix inliers: {}",
            matches.len(),
            count_h,
            count_e
        );

        let (model, mask) = match select_model(count_h, count_e, self.minimum_model_inliers) {
            Some(ModelKind::Homography) => (ModelKind::Homography, homography),
            Some(ModelKind::Essential) => (ModelKind::Essential, essential),
            None => {
                info!("rejecting pair, no model won the selection");
                return Verification::Rejected(Rejection::NoModel {
                    homography: count_h,
                    essential: count_e,
                });
            }
        };
        let inliers: Vec<FeatureMatch> = mask
            .iter()
            .flatten()
            .zip(matches)
            .filter(|&(&inlier, _)| inlier)
            .map(|(_, &m)| m)
            .collect();
        if inliers.is_empty() {
            info!("rejecting pair, the {:?} model kept no matches", model);
            return Verification::Rejected(Rejection::NoInliers);
        }
        info!("accepted {:?} with {} inliers", model, inliers.len());
        Verification::Accepted {
            model,
            matches: inliers,
        }
    }
}

/// A missing fit counts as zero inliers.
fn inlier_count(mask: &Option<Vec<bool>>, matches: usize) -> usize {
    match mask {
        Some(mask) => {
            assert_eq!(
                mask.len(),
                matches,
                "the estimator must return one inlier flag per match"
            );
            mask.iter().filter(|&&inlier| inlier).count()
        }
        None => 0,
    }
}
