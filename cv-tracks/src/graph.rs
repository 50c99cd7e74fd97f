//! The incremental track graph.
//!
//! Verified pairwise matches are folded in one pair at a time. Every feature of every pose
//! is either unassigned or assigned to exactly one point, and an assignment is never undone,
//! so the graph only ever grows until it is reset.

use crate::{
    export, BundleView, CalibrationModel, DenseIdMap, Error, FeatureMatch, ImageFeatures,
    Result,
};
use log::{debug, info};
use nalgebra::Point2;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Identifies one feature of one pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    /// The pose id, not the raw image index.
    pub pose: usize,
    pub feature: usize,
}

/// One measurement of a point in a pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub pose: usize,
    pub point: usize,
    pub xy: Point2<f64>,
}

/// What one call to [`TrackGraph::merge_pair`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub new_points: usize,
    pub new_observations: usize,
    /// Matches whose endpoints were already on the same point.
    pub duplicates: usize,
    /// Matches whose endpoints were already on two different points.
    pub conflicts: usize,
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.new_points += other.new_points;
        self.new_observations += other.new_observations;
        self.duplicates += other.duplicates;
        self.conflicts += other.conflicts;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackGraph {
    /// Raw image index to pose id.
    poses: DenseIdMap<usize>,
    point_ids: HashMap<ObservationKey, usize>,
    observations: Vec<Observation>,
    /// One RGB color per point, so its length is also the number of points.
    colors: Vec<[u8; 3]>,
    duplicates: usize,
    conflicts: usize,
}

impl TrackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the verified matches between raw images `raw_a` and `raw_b` into the graph.
    ///
    /// Panics if both raw indices are the same or if a match refers to a feature
    /// that does not exist in `features_a` or `features_b`.
    pub fn merge_pair(
        &mut self,
        raw_a: usize,
        raw_b: usize,
        features_a: &ImageFeatures,
        features_b: &ImageFeatures,
        matches: &[FeatureMatch],
    ) -> MergeStats {
        assert_ne!(raw_a, raw_b, "cannot merge an image with itself");
        for &FeatureMatch(query, train) in matches {
            assert!(
                query < features_a.len() && train < features_b.len(),
                "match ({}, {}) is out of range for {} and {} features",
                query,
                train,
                features_a.len(),
                features_b.len()
            );
        }

        let (pose_a, _) = self.poses.id_for(raw_a);
        let (pose_b, _) = self.poses.id_for(raw_b);

        let mut stats = MergeStats::default();
        for &FeatureMatch(query, train) in matches {
            let key_a = ObservationKey {
                pose: pose_a,
                feature: query,
            };
            let key_b = ObservationKey {
                pose: pose_b,
                feature: train,
            };
            match (self.point_ids.get(&key_a).copied(), self.point_ids.get(&key_b).copied()) {
                (None, None) => {
                    let point = self.colors.len();
                    self.point_ids.insert(key_a, point);
                    self.point_ids.insert(key_b, point);
                    self.observe(pose_a, point, features_a.point(query));
                    self.observe(pose_b, point, features_b.point(train));
                    self.colors
                        .push(average_color(features_a.color(query), features_b.color(train)));
                    stats.new_points += 1;
                    stats.new_observations += 2;
                }
                (Some(point), None) => {
                    self.point_ids.insert(key_b, point);
                    self.observe(pose_b, point, features_b.point(train));
                    stats.new_observations += 1;
                }
                (None, Some(point)) => {
                    self.point_ids.insert(key_a, point);
                    self.observe(pose_a, point, features_a.point(query));
                    stats.new_observations += 1;
                }
                (Some(point_a), Some(point_b)) if point_a == point_b => {
                    stats.duplicates += 1;
                }
                (Some(point_a), Some(point_b)) => {
                    debug!(
                        "features {:?} and {:?} belong to different points {} and {}",
                        key_a, key_b, point_a, point_b
                    );
                    stats.conflicts += 1;
                }
            }
        }
        self.duplicates += stats.duplicates;
        self.conflicts += stats.conflicts;
        info!(
            "merged pair ({}, {}): {} new points, {} new observations, {} duplicates, {} conflicts",
            raw_a,
            raw_b,
            stats.new_points,
            stats.new_observations,
            stats.duplicates,
            stats.conflicts
        );
        stats
    }

    fn observe(&mut self, pose: usize, point: usize, xy: Point2<f64>) {
        self.observations.push(Observation { pose, point, xy });
    }

    pub fn num_poses(&self) -> usize {
        self.poses.len()
    }

    pub fn num_points(&self) -> usize {
        self.colors.len()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// The RGB color of every point, indexed by point id.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn pose_id(&self, raw: usize) -> Option<usize> {
        self.poses.get(&raw)
    }

    pub fn raw_pose(&self, pose: usize) -> Option<usize> {
        self.poses.key(pose).copied()
    }

    pub fn point_id(&self, pose: usize, feature: usize) -> Option<usize> {
        self.point_ids
            .get(&ObservationKey { pose, feature })
            .copied()
    }

    /// The number of matches so far whose endpoints were already on two different points.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }

    /// The number of matches so far that were already represented.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// The observations of every point seen by both poses as `(point, xy_a, xy_b)`, ordered by point.
    ///
    /// If a pose observes a point more than once, its last observation is used.
    pub fn covisible(&self, pose_a: usize, pose_b: usize) -> Vec<(usize, Point2<f64>, Point2<f64>)> {
        let in_pose = |pose: usize| -> BTreeMap<usize, Point2<f64>> {
            self.observations
                .iter()
                .filter(|observation| observation.pose == pose)
                .map(|observation| (observation.point, observation.xy))
                .collect()
        };
        let a = in_pose(pose_a);
        let b = in_pose(pose_b);
        a.into_iter()
            .filter_map(|(point, xy_a)| b.get(&point).map(|&xy_b| (point, xy_a, xy_b)))
            .collect()
    }

    /// Empties the graph, including both id maps and the counters.
    pub fn reset(&mut self) {
        self.poses.clear();
        self.point_ids.clear();
        self.observations.clear();
        self.colors.clear();
        self.duplicates = 0;
        self.conflicts = 0;
    }

    pub fn view(&self) -> BundleView<'_> {
        BundleView {
            num_poses: self.num_poses(),
            num_points: self.num_points(),
            observations: &self.observations,
            colors: &self.colors,
        }
    }

    /// Writes the correspondence file, see [`export::write_correspondences`].
    ///
    /// With `normalize` the observations are written in normalized image coordinates
    /// of the working intrinsics of `calibration`.
    pub fn write_to_file(
        &self,
        path: impl AsRef<Path>,
        normalize: bool,
        calibration: &CalibrationModel,
    ) -> Result<()> {
        let path = path.as_ref();
        let io_error = |source| Error::Io {
            path: path.to_owned(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        export::write_correspondences(
            &mut writer,
            &self.view(),
            if normalize { Some(calibration) } else { None },
        )
        .map_err(io_error)?;
        writer.flush().map_err(io_error)?;
        info!(
            "wrote {} poses, {} points and {} observations to {}",
            self.num_poses(),
            self.num_points(),
            self.num_observations(),
            path.display()
        );
        Ok(())
    }
}

/// Averages two BGR colors channel by channel and returns the result as RGB.
///
/// Halves are rounded to the nearest even value.
fn average_color(a: [u8; 3], b: [u8; 3]) -> [u8; 3] {
    let average = |x: u8, y: u8| {
        let sum = x as u16 + y as u16;
        let half = sum / 2;
        if sum % 2 == 1 && half % 2 == 1 {
            (half + 1) as u8
        } else {
            half as u8
        }
    };
    [
        average(a[2], b[2]),
        average(a[1], b[1]),
        average(a[0], b[0]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Descriptor, KeyPoint};

    /// Feature `i` sits at `(i, offset)` with color `[i, i, i]`.
    fn features(len: usize, offset: f64) -> ImageFeatures {
        ImageFeatures::new(
            (0..len)
                .map(|ix| KeyPoint::at(Point2::new(ix as f64, offset)))
                .collect(),
            vec![Descriptor::zeros(); len],
            (0..len).map(|ix| [ix as u8; 3]).collect(),
        )
    }

    fn diagonal(len: usize) -> Vec<FeatureMatch> {
        (0..len).map(|ix| FeatureMatch(ix, ix)).collect()
    }

    fn assert_invariants(graph: &TrackGraph) {
        for observation in graph.observations() {
            assert!(observation.pose < graph.num_poses());
            assert!(observation.point < graph.num_points());
        }
        assert_eq!(graph.colors().len(), graph.num_points());
    }

    #[test]
    fn fresh_pair_creates_one_point_per_match() {
        let mut graph = TrackGraph::new();
        let stats = graph.merge_pair(0, 1, &features(10, 0.0), &features(10, 1.0), &diagonal(6));
        assert_eq!(
            stats,
            MergeStats {
                new_points: 6,
                new_observations: 12,
                duplicates: 0,
                conflicts: 0
            }
        );
        assert_eq!(graph.num_points(), 6);
        assert_eq!(graph.num_observations(), 12);
        assert_eq!(graph.num_poses(), 2);
        assert_eq!(
            graph.observations()[..2],
            [
                Observation {
                    pose: 0,
                    point: 0,
                    xy: Point2::new(0.0, 0.0)
                },
                Observation {
                    pose: 1,
                    point: 0,
                    xy: Point2::new(0.0, 1.0)
                },
            ]
        );
        assert_invariants(&graph);
    }

    #[test]
    fn merging_twice_changes_nothing() {
        let (a, b) = (features(10, 0.0), features(10, 1.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &a, &b, &diagonal(5));
        let stats = graph.merge_pair(0, 1, &a, &b, &diagonal(5));
        assert_eq!(stats.duplicates, 5);
        assert_eq!(stats.new_points + stats.new_observations, 0);
        assert_eq!(graph.num_points(), 5);
        assert_eq!(graph.num_observations(), 10);
        assert_eq!(graph.duplicates(), 5);
    }

    #[test]
    fn poses_are_numbered_in_first_seen_order() {
        let features = features(4, 0.0);
        let mut graph = TrackGraph::new();
        graph.merge_pair(2, 0, &features, &features, &diagonal(2));
        graph.merge_pair(0, 1, &features, &features, &diagonal(2));
        assert_eq!(graph.pose_id(2), Some(0));
        assert_eq!(graph.pose_id(0), Some(1));
        assert_eq!(graph.pose_id(1), Some(2));
        assert_eq!(graph.raw_pose(2), Some(1));
        assert_eq!(graph.pose_id(3), None);
    }

    #[test]
    fn partial_extension_reuses_the_point() {
        let (a, b, c) = (features(10, 0.0), features(10, 1.0), features(10, 2.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &a, &b, &[FeatureMatch(5, 3)]);
        let point = graph.point_id(0, 5).unwrap();
        let color = graph.colors()[point];

        let stats = graph.merge_pair(0, 2, &a, &c, &[FeatureMatch(5, 7)]);
        assert_eq!(stats.new_observations, 1);
        assert_eq!(stats.new_points, 0);
        assert_eq!(graph.num_points(), 1);
        assert_eq!(graph.point_id(2, 7), Some(point));
        assert_eq!(graph.colors()[point], color);
        assert_eq!(
            graph.observations().last(),
            Some(&Observation {
                pose: 2,
                point,
                xy: Point2::new(7.0, 2.0)
            })
        );
        assert_invariants(&graph);
    }

    #[test]
    fn extension_from_the_train_side() {
        let (a, b, c) = (features(10, 0.0), features(10, 1.0), features(10, 2.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &a, &b, &[FeatureMatch(5, 3)]);
        let stats = graph.merge_pair(2, 1, &c, &b, &[FeatureMatch(8, 3)]);
        assert_eq!(stats.new_observations, 1);
        assert_eq!(graph.point_id(2, 8), Some(0));
    }

    #[test]
    fn conflicts_are_counted_and_skipped() {
        let (a, b, c) = (features(10, 0.0), features(10, 1.0), features(10, 2.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &a, &b, &[FeatureMatch(1, 1)]);
        graph.merge_pair(0, 2, &a, &c, &[FeatureMatch(2, 2)]);
        // Feature 1 of pose 1 and feature 2 of pose 2 are on different points.
        let stats = graph.merge_pair(1, 2, &b, &c, &[FeatureMatch(1, 2)]);
        assert_eq!(stats.conflicts, 1);
        assert_eq!(graph.conflicts(), 1);
        assert_eq!(graph.num_points(), 2);
        assert_eq!(graph.num_observations(), 4);
        assert_eq!(graph.point_id(1, 1), Some(0));
        assert_eq!(graph.point_id(2, 2), Some(1));
    }

    #[test]
    fn colors_are_averaged_and_reversed() {
        assert_eq!(average_color([10, 20, 30], [20, 40, 60]), [45, 30, 15]);
        // Halves round to even.
        assert_eq!(average_color([1, 2, 254], [2, 3, 255]), [254, 2, 2]);
    }

    #[test]
    fn merged_point_color_comes_from_both_features() {
        let mut graph = TrackGraph::new();
        graph.merge_pair(3, 4, &features(10, 0.0), &features(10, 0.0), &[FeatureMatch(2, 6)]);
        assert_eq!(graph.colors(), &[[4, 4, 4]]);
    }

    #[test]
    fn covisible_points() {
        let (a, b, c) = (features(10, 0.0), features(10, 1.0), features(10, 2.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &a, &b, &[FeatureMatch(1, 1), FeatureMatch(4, 3)]);
        graph.merge_pair(0, 2, &a, &c, &[FeatureMatch(4, 9)]);
        assert_eq!(
            graph.covisible(1, 2),
            vec![(1, Point2::new(3.0, 1.0), Point2::new(9.0, 2.0))]
        );
        assert_eq!(graph.covisible(0, 1).len(), 2);
    }

    #[test]
    fn reset_empties_everything() {
        let (a, b) = (features(10, 0.0), features(10, 1.0));
        let mut graph = TrackGraph::new();
        graph.merge_pair(5, 6, &a, &b, &diagonal(4));
        graph.merge_pair(5, 6, &a, &b, &diagonal(4));
        graph.reset();
        assert_eq!(graph.num_poses(), 0);
        assert_eq!(graph.num_points(), 0);
        assert_eq!(graph.num_observations(), 0);
        assert!(graph.observations().is_empty());
        assert!(graph.colors().is_empty());
        assert_eq!(graph.duplicates(), 0);
        assert_eq!(graph.pose_id(5), None);
        assert_eq!(graph.point_id(0, 0), None);

        graph.merge_pair(6, 5, &a, &b, &diagonal(1));
        assert_eq!(graph.pose_id(6), Some(0));
    }

    #[test]
    #[should_panic]
    fn out_of_range_feature_panics() {
        let mut graph = TrackGraph::new();
        graph.merge_pair(0, 1, &features(3, 0.0), &features(3, 0.0), &[FeatureMatch(0, 3)]);
    }

    #[test]
    #[should_panic]
    fn self_pair_panics() {
        let features = features(3, 0.0);
        TrackGraph::new().merge_pair(1, 1, &features, &features, &diagonal(1));
    }
}
