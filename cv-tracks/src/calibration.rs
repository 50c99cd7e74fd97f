use image::{Rgb, RgbImage};
use nalgebra::{Matrix2, Matrix3, Point2, Vector2};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// A camera without skew.
    pub fn new(focals: Vector2<f64>, principal_point: Point2<f64>) -> Self {
        Self {
            focals,
            principal_point,
            skew: 0.0,
        }
    }

    pub fn with_skew(self, skew: f64) -> Self {
        Self { skew, ..self }
    }

    /// The same camera with both focal lengths multiplied by `scale`.
    ///
    /// Shrinking the focal lengths widens the field of view rendered into an image of the same
    /// size, so no source pixel is cropped when undistorting strong barrel distortion.
    pub fn scale_focals(&self, scale: f64) -> Self {
        Self {
            focals: self.focals * scale,
            ..*self
        }
    }

    /// The upper triangular matrix `K` that maps normalized image coordinates to pixels.
    pub fn matrix(&self) -> Matrix3<f64> {
        let mut k = Matrix3::identity();
        k.fixed_slice_mut::<2, 2>(0, 0)
            .copy_from(&Matrix2::new(self.focals.x, self.skew, 0.0, self.focals.y));
        k.fixed_slice_mut::<2, 1>(0, 2)
            .copy_from(&self.principal_point.coords);
        k
    }

    /// Converts a pixel into normalized image coordinates.
    pub fn calibrate(&self, pixel: Point2<f64>) -> Point2<f64> {
        let centered = pixel - self.principal_point;
        let y = centered.y / self.focals.y;
        let x = (centered.x - self.skew * y) / self.focals.x;
        Point2::new(x, y)
    }

    /// Converts normalized image coordinates back into pixels.
    pub fn uncalibrate(&self, normalized: Point2<f64>) -> Point2<f64> {
        let y = normalized.y * self.focals.y;
        let x = normalized.x * self.focals.x + self.skew * normalized.y;
        Point2::new(x, y) + self.principal_point.coords
    }
}

/// Brown-Conrady lens distortion with coefficients in the order `k1, k2, p1, p2, k3`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds the distortion from a coefficient slice, missing trailing coefficients are zero.
    pub fn from_coefficients(coefficients: &[f64]) -> Self {
        let c = |ix: usize| coefficients.get(ix).copied().unwrap_or(0.0);
        Self {
            k1: c(0),
            k2: c(1),
            p1: c(2),
            p2: c(3),
            k3: c(4),
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }

    /// Applies the distortion to an undistorted point in normalized image coordinates.
    pub fn distort(&self, point: Point2<f64>) -> Point2<f64> {
        let (x, y) = (point.x, point.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy = 2.0 * x * y;
        Point2::new(
            x * radial + self.p1 * xy + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy,
        )
    }
}

/// The calibrated camera all images of a reconstruction were captured with.
///
/// The working intrinsics are the original intrinsics with both focal lengths multiplied
/// by the focal scale. Undistorted images are rendered with the working intrinsics, so every
/// keypoint extracted downstream lives in a distortion-free camera described by them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    intrinsics: CameraIntrinsics,
    distortion: Distortion,
    working: CameraIntrinsics,
}

impl CalibrationModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion, focal_scale: f64) -> Self {
        assert!(
            focal_scale.is_finite() && focal_scale > 0.0,
            "focal scale must be positive and finite, got {}",
            focal_scale
        );
        let working = intrinsics.scale_focals(focal_scale);
        Self {
            intrinsics,
            distortion,
            working,
        }
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    pub fn working_intrinsics(&self) -> &CameraIntrinsics {
        &self.working
    }

    pub fn working_matrix(&self) -> Matrix3<f64> {
        self.working.matrix()
    }

    /// Renders the image as it would look through the working intrinsics without distortion.
    ///
    /// Destination pixels whose source falls outside of `image` are black.
    pub fn undistort_image(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        RgbImage::from_fn(width, height, |u, v| {
            let normalized = self.working.calibrate(Point2::new(u as f64, v as f64));
            let source = self
                .intrinsics
                .uncalibrate(self.distortion.distort(normalized));
            sample_bilinear(image, source).unwrap_or(Rgb([0, 0, 0]))
        })
    }

    /// Maps a pixel of an undistorted image to normalized image coordinates.
    pub fn normalize(&self, pixel: Point2<f64>) -> Point2<f64> {
        self.working.calibrate(pixel)
    }

    pub fn normalize_all<'a>(
        &'a self,
        pixels: impl IntoIterator<Item = Point2<f64>> + 'a,
    ) -> impl Iterator<Item = Point2<f64>> + 'a {
        pixels.into_iter().map(move |pixel| self.normalize(pixel))
    }
}

fn sample_bilinear(image: &RgbImage, point: Point2<f64>) -> Option<Rgb<u8>> {
    // Tolerates the rounding error of the pixel round trip on the last row and column.
    const EDGE: f64 = 1e-6;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = (width as f64) - 1.0;
    let max_y = (height as f64) - 1.0;
    let inside = |value: f64, max: f64| value >= -EDGE && value <= max + EDGE;
    if !(inside(point.x, max_x) && inside(point.y, max_y)) {
        return None;
    }
    let (x, y) = (point.x.clamp(0.0, max_x), point.y.clamp(0.0, max_y));
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let [p00, p10, p01, p11] = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)]
        .map(|(x, y)| image.get_pixel(x, y).0);
    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let top = p00[channel] as f64 * (1.0 - fx) + p10[channel] as f64 * fx;
        let bottom = p01[channel] as f64 * (1.0 - fx) + p11[channel] as f64 * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}
