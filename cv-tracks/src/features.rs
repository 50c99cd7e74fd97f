use akaze::Akaze;
use bitarray::BitArray;
use image::{DynamicImage, RgbImage};
use log::info;
use nalgebra::Point2;

/// A binary descriptor compared with the Hamming distance.
pub type Descriptor = BitArray<64>;

/// A color in the channel order blue, green, red.
pub type Bgr = [u8; 3];

/// A point of interest in an undistorted image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// The position in pixels, +x right and +y down from the top left corner.
    pub point: Point2<f64>,
    /// The radius defining the extent of the keypoint, in pixel units
    pub size: f64,
    /// The orientation angle
    pub angle: f64,
    /// The magnitude of response from the detector.
    pub response: f64,
    /// The level of scale space in which the keypoint was detected.
    pub octave: usize,
}

impl KeyPoint {
    pub fn at(point: Point2<f64>) -> Self {
        Self {
            point,
            size: 1.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }
}

impl From<akaze::KeyPoint> for KeyPoint {
    fn from(keypoint: akaze::KeyPoint) -> Self {
        Self {
            point: Point2::new(keypoint.point.0 as f64, keypoint.point.1 as f64),
            size: keypoint.size as f64,
            angle: keypoint.angle as f64,
            response: keypoint.response as f64,
            octave: keypoint.octave,
        }
    }
}

/// The features of one image.
///
/// Keypoints, descriptors and colors are index aligned and never reordered,
/// so a feature index identifies the same feature in all three.
#[derive(Debug, Clone, Default)]
pub struct ImageFeatures {
    keypoints: Vec<KeyPoint>,
    descriptors: Vec<Descriptor>,
    colors: Vec<Bgr>,
}

impl ImageFeatures {
    /// Panics if the three sequences do not have the same length.
    pub fn new(keypoints: Vec<KeyPoint>, descriptors: Vec<Descriptor>, colors: Vec<Bgr>) -> Self {
        assert_eq!(
            keypoints.len(),
            descriptors.len(),
            "every keypoint needs exactly one descriptor"
        );
        assert_eq!(
            keypoints.len(),
            colors.len(),
            "every keypoint needs exactly one color"
        );
        Self {
            keypoints,
            descriptors,
            colors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, feature: usize) -> Point2<f64> {
        self.keypoints[feature].point
    }

    pub fn descriptor(&self, feature: usize) -> &Descriptor {
        &self.descriptors[feature]
    }

    pub fn color(&self, feature: usize) -> Bgr {
        self.colors[feature]
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn colors(&self) -> &[Bgr] {
        &self.colors
    }
}

/// Something that can detect and describe the features of an image.
pub trait FeatureProvider {
    fn extract(&self, image: &RgbImage) -> ImageFeatures;
}

/// Extracts AKAZE keypoints and binary descriptors.
#[derive(Debug, Clone)]
pub struct AkazeProvider {
    akaze: Akaze,
}

impl AkazeProvider {
    pub fn new(threshold: f64) -> Self {
        Self {
            akaze: Akaze::new(threshold),
        }
    }
}

impl Default for AkazeProvider {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl FeatureProvider for AkazeProvider {
    fn extract(&self, image: &RgbImage) -> ImageFeatures {
        let (keypoints, descriptors) = self
            .akaze
            .extract(&DynamicImage::ImageRgb8(image.clone()));
        let keypoints: Vec<KeyPoint> = keypoints.into_iter().map(KeyPoint::from).collect();
        let descriptors = descriptors
            .iter()
            .map(|descriptor| Descriptor::new(*descriptor.bytes()))
            .collect();
        let colors = keypoints
            .iter()
            .map(|keypoint| sample_color(image, keypoint.point))
            .collect();
        info!("extracted {} features", keypoints.len());
        ImageFeatures::new(keypoints, descriptors, colors)
    }
}

/// Reads the color at the rounded pixel position, clamped to the image.
///
/// Panics if the image is empty.
pub fn sample_color(image: &RgbImage, point: Point2<f64>) -> Bgr {
    let (width, height) = image.dimensions();
    assert!(width > 0 && height > 0, "cannot sample an empty image");
    let clamp = |value: f64, size: u32| {
        let rounded = value.round();
        if rounded.is_nan() || rounded < 0.0 {
            0
        } else {
            (rounded as u32).min(size - 1)
        }
    };
    let [r, g, b] = image
        .get_pixel(clamp(point.x, width), clamp(point.y, height))
        .0;
    [b, g, r]
}
