use crate::{Descriptor, ImageFeatures};

/// A correspondence between feature `.0` of image A (the query) and feature `.1` of image B (the train).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureMatch(pub usize, pub usize);

impl FeatureMatch {
    pub fn query(&self) -> usize {
        self.0
    }

    pub fn train(&self) -> usize {
        self.1
    }
}

/// Finds raw correspondences between the features of two images.
pub trait Matcher {
    fn match_features(&self, a: &ImageFeatures, b: &ImageFeatures) -> Vec<FeatureMatch>;
}

/// Brute-force Hamming matching that keeps only mutual best matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossCheckMatcher;

impl Matcher for CrossCheckMatcher {
    fn match_features(&self, a: &ImageFeatures, b: &ImageFeatures) -> Vec<FeatureMatch> {
        symmetric_matching(a.descriptors(), b.descriptors())
    }
}

/// The best match in `b` for every descriptor of `a`, the lowest index wins ties.
fn matching(a: &[Descriptor], b: &[Descriptor]) -> Vec<Option<usize>> {
    a.iter()
        .map(|a_descriptor| {
            b.iter()
                .map(|b_descriptor| a_descriptor.distance(b_descriptor))
                .enumerate()
                .min_by_key(|&(_, distance)| distance)
                .map(|(bix, _)| bix)
        })
        .collect()
}

fn symmetric_matching(a: &[Descriptor], b: &[Descriptor]) -> Vec<FeatureMatch> {
    // The best match for each feature in a to b's features.
    let forward_matches = matching(a, b);
    // The best match for each feature in b to a's features.
    let reverse_matches = matching(b, a);
    forward_matches
        .into_iter()
        .enumerate()
        .filter_map(|(aix, bix)| {
            // Symmetric is defined as the best match of a being b,
            // and likewise the best match of b being a.
            bix.map(|bix| FeatureMatch(aix, bix))
                .filter(|&FeatureMatch(aix, bix)| reverse_matches[bix] == Some(aix))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPoint;
    use nalgebra::Point2;

    fn descriptor(first_byte: u8) -> Descriptor {
        let mut bytes = [0u8; 64];
        bytes[0] = first_byte;
        Descriptor::new(bytes)
    }

    fn features(first_bytes: &[u8]) -> ImageFeatures {
        ImageFeatures::new(
            first_bytes
                .iter()
                .map(|&v| KeyPoint::at(Point2::new(v as f64, 0.0)))
                .collect(),
            first_bytes.iter().map(|&v| descriptor(v)).collect(),
            vec![[0, 0, 0]; first_bytes.len()],
        )
    }

    #[test]
    fn mutual_best_matches_only() {
        // b[0] also prefers a[0], but a[0] prefers b[1].
        let a = features(&[0b0000_0000, 0b1111_0000]);
        let b = features(&[0b0000_0011, 0b0000_0001, 0b1111_1000]);
        assert_eq!(
            CrossCheckMatcher.match_features(&a, &b),
            vec![FeatureMatch(0, 1), FeatureMatch(1, 2)]
        );
    }

    #[test]
    fn ties_prefer_the_lowest_index() {
        let a = features(&[0b0000_0000]);
        let b = features(&[0b0000_0001, 0b0000_0010]);
        assert_eq!(
            CrossCheckMatcher.match_features(&a, &b),
            vec![FeatureMatch(0, 0)]
        );
    }

    #[test]
    fn empty_side_yields_nothing() {
        let a = features(&[1, 2, 3]);
        let b = features(&[]);
        assert!(CrossCheckMatcher.match_features(&a, &b).is_empty());
        assert!(CrossCheckMatcher.match_features(&b, &a).is_empty());
    }
}
