//! Estimates an essential matrix between two calibrated views from eight pixel correspondences.
//!
//! Pixels are first mapped to normalized image coordinates through the inverse of the camera
//! intrinsic matrix, then the
//! [eight-point algorithm](https://en.wikipedia.org/wiki/Eight-point_algorithm)
//! by Richard Hartley and Andrew Zisserman is run on Hartley-normalized coordinates.
//! The resulting matrix is reconditioned so that it has two equal singular values and a null one.

use float_ord::FloatOrd;
use four_point::{normalize, null_vector};
use nalgebra::{self, Matrix3, OMatrix, Point2, U8, U9};
use sample_consensus::{Estimator, Model};

/// A pair of corresponding pixel coordinates `[a, b]`, one from image A and one from image B.
pub type PixelMatch = [Point2<f64>; 2];

/// This stores an essential matrix alongside the fundamental matrix it induces for one
/// camera intrinsic matrix `K`.
///
/// The essential matrix satisfies `transpose(x_b) * E * x_a = 0` for homogeneous
/// normalized image coordinates, and the fundamental matrix
/// `F = transpose(inverse(K)) * E * inverse(K)` satisfies the same constraint for pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EssentialMatrix {
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
}

impl EssentialMatrix {
    /// Finds the closest essential matrix in frobenius form.
    ///
    /// The two largest singular values are averaged and the smallest one is forced to zero.
    pub fn recondition(
        essential: Matrix3<f64>,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<Matrix3<f64>> {
        let mut svd = essential.try_svd(true, true, epsilon, max_iterations)?;
        let smallest = (0..3).min_by_key(|&ix| FloatOrd(svd.singular_values[ix]))?;
        let average = ((0..3)
            .filter(|&ix| ix != smallest)
            .map(|ix| svd.singular_values[ix])
            .sum::<f64>())
            / 2.0;
        for ix in 0..3 {
            svd.singular_values[ix] = if ix == smallest { 0.0 } else { average };
        }
        svd.recompose().ok()
    }

    /// The Sampson distance of a pixel correspondence from the epipolar constraint, in pixels.
    pub fn sampson_distance(&self, &[a, b]: &PixelMatch) -> f64 {
        let xa = a.to_homogeneous();
        let xb = b.to_homogeneous();
        let fa = self.fundamental * xa;
        let ftb = self.fundamental.transpose() * xb;
        let denominator = fa.x * fa.x + fa.y * fa.y + ftb.x * ftb.x + ftb.y * ftb.y;
        if !(denominator > f64::EPSILON) {
            return f64::INFINITY;
        }
        xb.dot(&fa).abs() / denominator.sqrt()
    }
}

impl Model<PixelMatch> for EssentialMatrix {
    fn residual(&self, data: &PixelMatch) -> f64 {
        let residual = self.sampson_distance(data);
        if residual.is_finite() {
            residual
        } else {
            f64::INFINITY
        }
    }
}

/// Performs the normalized eight-point algorithm for one camera.
///
/// Both images are assumed to have been captured with the same intrinsics.
#[derive(Copy, Clone, Debug)]
pub struct EightPoint {
    pub epsilon: f64,
    pub iterations: usize,
    intrinsics_inverse: Matrix3<f64>,
}

impl EightPoint {
    /// Creates the estimator for a camera intrinsic matrix.
    ///
    /// Returns `None` if the intrinsic matrix is not invertible.
    pub fn new(intrinsics: Matrix3<f64>) -> Option<Self> {
        let intrinsics_inverse = intrinsics.try_inverse()?;
        Some(Self {
            epsilon: 1e-12,
            iterations: 1000,
            intrinsics_inverse,
        })
    }

    /// Maps a pixel to normalized image coordinates.
    pub fn calibrate(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        Point2::from_homogeneous(self.intrinsics_inverse * pixel.to_homogeneous())
    }

    /// Estimates the essential matrix from the first eight matches of `data`.
    pub fn from_matches<I>(&self, data: I) -> Option<EssentialMatrix>
    where
        I: Iterator<Item = PixelMatch>,
    {
        let mut a = [Point2::origin(); 8];
        let mut b = [Point2::origin(); 8];
        let mut count = 0;
        for (ix, [pa, pb]) in (0..8).zip(data) {
            a[ix] = self.calibrate(pa)?;
            b[ix] = self.calibrate(pb)?;
            count += 1;
        }
        if count < 8 {
            return None;
        }

        let (transform_a, normalized_a) = normalize(&a)?;
        let (transform_b, normalized_b) = normalize(&b)?;

        let system = encode_epipolar_equation(&normalized_a, &normalized_b);
        let e = null_vector(system.transpose() * system, self.epsilon, self.iterations)?;
        // The eigenvector holds E in row-major order.
        let normalized = Matrix3::from_iterator(e.iter().copied()).transpose();
        let essential = transform_b.transpose() * normalized * transform_a;
        let essential = EssentialMatrix::recondition(essential, self.epsilon, self.iterations)?;
        let norm = essential.norm();
        if !(norm > f64::EPSILON) || !essential.iter().all(|v| v.is_finite()) {
            return None;
        }
        let essential = essential / norm;
        let fundamental = self.intrinsics_inverse.transpose() * essential * self.intrinsics_inverse;
        Some(EssentialMatrix {
            essential,
            fundamental,
        })
    }
}

impl Estimator<PixelMatch> for EightPoint {
    type Model = EssentialMatrix;
    type ModelIter = Option<EssentialMatrix>;
    const MIN_SAMPLES: usize = 8;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PixelMatch> + Clone,
    {
        self.from_matches(data)
    }
}

fn encode_epipolar_equation(a: &[Point2<f64>; 8], b: &[Point2<f64>; 8]) -> OMatrix<f64, U8, U9> {
    let mut out: OMatrix<f64, U8, U9> = nalgebra::zero();
    for (i, (pa, pb)) in a.iter().zip(b).enumerate() {
        let ap = pa.to_homogeneous();
        let bp = pb.to_homogeneous();
        for j in 0..3 {
            for k in 0..3 {
                out[(i, 3 * j + k)] = bp[j] * ap[k];
            }
        }
    }
    out
}
