use crate::{Error, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings for the correspondence pipeline.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TracksSettings {
    /// The factor applied to both focal lengths of the intrinsics to get the working intrinsics
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_focal_scale"))]
    pub focal_scale: f64,
    /// The threshold used for akaze
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_akaze_threshold")
    )]
    pub akaze_threshold: f64,
    /// Pairs with fewer raw matches than this are rejected without fitting any model
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_minimum_raw_matches")
    )]
    pub minimum_raw_matches: usize,
    /// A model must have strictly more inliers than this to be selected
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_minimum_model_inliers")
    )]
    pub minimum_model_inliers: usize,
    /// The maximum transfer error in pixels of a homography inlier
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_homography_threshold")
    )]
    pub homography_threshold: f64,
    /// The maximum Sampson distance in pixels of an essential matrix inlier
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_essential_threshold")
    )]
    pub essential_threshold: f64,
    /// The seed of the random number generators used by the consensus process
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_consensus_seed")
    )]
    pub consensus_seed: u64,
    /// Export normalized image coordinates instead of pixels
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_normalize_points")
    )]
    pub normalize_points: bool,
}

impl TracksSettings {
    /// Checks the settings that would otherwise break a precondition further down.
    pub fn validate(&self) -> Result<()> {
        if !(self.focal_scale.is_finite() && self.focal_scale > 0.0) {
            return Err(Error::Settings(format!(
                "focal_scale must be positive and finite, got {}",
                self.focal_scale
            )));
        }
        if !(self.homography_threshold > 0.0) || !(self.essential_threshold > 0.0) {
            return Err(Error::Settings(format!(
                "consensus thresholds must be positive, got {} (homography) and {} (essential)",
                self.homography_threshold, self.essential_threshold
            )));
        }
        Ok(())
    }
}

impl Default for TracksSettings {
    fn default() -> Self {
        Self {
            focal_scale: default_focal_scale(),
            akaze_threshold: default_akaze_threshold(),
            minimum_raw_matches: default_minimum_raw_matches(),
            minimum_model_inliers: default_minimum_model_inliers(),
            homography_threshold: default_homography_threshold(),
            essential_threshold: default_essential_threshold(),
            consensus_seed: default_consensus_seed(),
            normalize_points: default_normalize_points(),
        }
    }
}

fn default_focal_scale() -> f64 {
    1.0
}

fn default_akaze_threshold() -> f64 {
    0.001
}

fn default_minimum_raw_matches() -> usize {
    8
}

fn default_minimum_model_inliers() -> usize {
    20
}

fn default_homography_threshold() -> f64 {
    3.0
}

fn default_essential_threshold() -> f64 {
    1.0
}

fn default_consensus_seed() -> u64 {
    5
}

fn default_normalize_points() -> bool {
    false
}
