//! # Correspondence tracks for bundle adjustment
//!
//! This crate turns a set of images of a static scene, all captured with one calibrated camera,
//! into the correspondence file that bundle adjustment solvers expect.
//!
//! Every image is undistorted with a [`CalibrationModel`] and its features are extracted by a
//! [`FeatureProvider`]. For every pair of images the features are matched by a [`Matcher`] and
//! the raw matches are verified by a [`TwoViewVerifier`], which fits a homography and an essential
//! matrix and keeps the inliers of the winning model. The verified matches of each pair are then
//! folded into a [`TrackGraph`], which links the observations of the same physical point across
//! pairs into tracks. Finally the graph is written with [`write_correspondences`].
//!
//! [`TrackPipeline`] ties all of these together. The feature provider, the matcher and the
//! two-view estimator are traits so that any part can be replaced.

mod calibration;
mod error;
mod estimation;
pub mod export;
mod features;
mod graph;
mod id_map;
mod matching;
mod pipeline;
mod settings;
mod verification;

pub use calibration::*;
pub use error::*;
pub use estimation::*;
pub use export::{read_correspondences, write_correspondences, BundleFile, BundleView};
pub use features::*;
pub use graph::*;
pub use id_map::*;
pub use matching::*;
pub use pipeline::*;
pub use settings::*;
pub use verification::*;

pub use akaze;
pub use bitarray;
pub use image;
pub use nalgebra;
