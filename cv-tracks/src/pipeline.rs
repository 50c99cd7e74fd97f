use crate::{
    AkazeProvider, ArrsacEstimator, CalibrationModel, CameraIntrinsics, CrossCheckMatcher,
    Distortion, Error, FeatureProvider, ImageFeatures, Matcher, MergeStats, ModelKind, Rejection,
    Result, TrackGraph, TracksSettings, TwoViewEstimator, TwoViewVerifier, Verification,
};
use log::info;
use rand_pcg::Pcg64;
use std::path::Path;

/// The outcome of an accepted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub model: ModelKind,
    pub inliers: usize,
    pub merge: MergeStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    /// The raw image index of the query image.
    pub first: usize,
    /// The raw image index of the train image.
    pub second: usize,
    pub raw_matches: usize,
    pub outcome: std::result::Result<Accepted, Rejection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchingReport {
    /// Every visited pair in visiting order.
    pub pairs: Vec<PairReport>,
}

impl MatchingReport {
    pub fn accepted(&self) -> usize {
        self.pairs.iter().filter(|pair| pair.outcome.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.pairs.len() - self.accepted()
    }

    /// The sum of the merge statistics of all accepted pairs.
    pub fn merged(&self) -> MergeStats {
        let mut total = MergeStats::default();
        for accepted in self.pairs.iter().filter_map(|pair| pair.outcome.ok()) {
            total += accepted.merge;
        }
        total
    }
}

/// Turns a set of images of one calibrated camera into a track graph.
pub struct TrackPipeline<F, M, E> {
    calibration: CalibrationModel,
    provider: F,
    matcher: M,
    verifier: TwoViewVerifier<E>,
    normalize_points: bool,
    features: Vec<ImageFeatures>,
    graph: TrackGraph,
}

impl TrackPipeline<AkazeProvider, CrossCheckMatcher, ArrsacEstimator<Pcg64>> {
    /// Uses AKAZE features, cross-checked Hamming matching and ARRSAC.
    pub fn from_settings(
        settings: TracksSettings,
        intrinsics: CameraIntrinsics,
        distortion: Distortion,
    ) -> Result<Self> {
        settings.validate()?;
        let calibration = CalibrationModel::new(intrinsics, distortion, settings.focal_scale);
        let estimator = ArrsacEstimator::new(
            settings.homography_threshold,
            settings.essential_threshold,
            settings.consensus_seed,
        );
        let verifier = TwoViewVerifier::new(estimator)
            .minimum_raw_matches(settings.minimum_raw_matches)
            .minimum_model_inliers(settings.minimum_model_inliers);
        Ok(Self::new(
            calibration,
            AkazeProvider::new(settings.akaze_threshold),
            CrossCheckMatcher,
            verifier,
        )
        .normalize_points(settings.normalize_points))
    }
}

impl<F, M, E> TrackPipeline<F, M, E>
where
    F: FeatureProvider,
    M: Matcher,
    E: TwoViewEstimator,
{
    pub fn new(
        calibration: CalibrationModel,
        provider: F,
        matcher: M,
        verifier: TwoViewVerifier<E>,
    ) -> Self {
        Self {
            calibration,
            provider,
            matcher,
            verifier,
            normalize_points: false,
            features: vec![],
            graph: TrackGraph::new(),
        }
    }

    /// Sets the default of the `normalize` flag used by [`TrackPipeline::write`].
    pub fn normalize_points(self, normalize_points: bool) -> Self {
        Self {
            normalize_points,
            ..self
        }
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    /// Undistorts the image and extracts its features, returning the raw image index.
    pub fn add_image(&mut self, image: &image::RgbImage) -> usize {
        let undistorted = self.calibration.undistort_image(image);
        let features = self.provider.extract(&undistorted);
        self.add_features(features)
    }

    pub fn add_image_path(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        info!("loading {}", path.display());
        let image = image::open(path)?.to_rgb8();
        Ok(self.add_image(&image))
    }

    /// Adds features of an image that is already undistorted, returning the raw image index.
    pub fn add_features(&mut self, features: ImageFeatures) -> usize {
        self.features.push(features);
        self.features.len() - 1
    }

    pub fn features(&self) -> &[ImageFeatures] {
        &self.features
    }

    /// Matches, verifies and merges every pair `(i, j)` with `i < j`, in ascending order.
    pub fn exhaustive_matching(&mut self) -> Result<MatchingReport> {
        if self.features.len() < 2 {
            return Err(Error::NotEnoughImages(self.features.len()));
        }
        let intrinsics = self.calibration.working_matrix();
        let mut report = MatchingReport::default();
        for i in 0..self.features.len() {
            for j in i + 1..self.features.len() {
                let (a, b) = (&self.features[i], &self.features[j]);
                let matches = self.matcher.match_features(a, b);
                info!("pair ({}, {}): {} raw matches", i, j, matches.len());
                let outcome = match self.verifier.verify(a, b, &matches, &intrinsics) {
                    Verification::Accepted { model, matches: inliers } => {
                        let merge = self.graph.merge_pair(i, j, a, b, &inliers);
                        Ok(Accepted {
                            model,
                            inliers: inliers.len(),
                            merge,
                        })
                    }
                    Verification::Rejected(rejection) => Err(rejection),
                };
                report.pairs.push(PairReport {
                    first: i,
                    second: j,
                    raw_matches: matches.len(),
                    outcome,
                });
            }
        }
        info!(
            "accepted {} of {} pairs, {} poses, {} points, {} observations, {} conflicts",
            report.accepted(),
            report.pairs.len(),
            self.graph.num_poses(),
            self.graph.num_points(),
            self.graph.num_observations(),
            self.graph.conflicts()
        );
        Ok(report)
    }

    pub fn graph(&self) -> &TrackGraph {
        &self.graph
    }

    /// Writes the graph, normalizing observations if configured to.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to_file(path, self.normalize_points)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>, normalize: bool) -> Result<()> {
        self.graph.write_to_file(path, normalize, &self.calibration)
    }

    /// Clears the track graph, the extracted features are kept.
    pub fn reset(&mut self) {
        self.graph.reset();
    }
}
