//! Estimates a [homography](https://en.wikipedia.org/wiki/Homography_(computer_vision))
//! between two images from four pixel correspondences.
//!
//! The estimator runs the normalized direct linear transform (DLT) described by
//! Hartley and Zisserman. Both point sets are translated to their centroid and scaled so
//! that their mean distance from the origin is `sqrt(2)` before the linear system is solved,
//! which keeps the system well conditioned for pixel coordinates.
//!
//! Plug [`FourPoint`] into any [`sample_consensus::Consensus`] algorithm to get a robust fit.

use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use float_ord::FloatOrd;
use nalgebra::{self, Matrix3, OMatrix, OVector, Point2, Vector2, U8, U9};
use sample_consensus::{Estimator, Model};

/// A pair of corresponding pixel coordinates `[a, b]`, one from image A and one from image B.
pub type PixelMatch = [Point2<f64>; 2];

/// Maps homogeneous pixel coordinates of image A onto image B, `b ~ H * a`.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    /// Transfers a pixel of image A into image B.
    ///
    /// Returns `None` when the point maps to infinity.
    pub fn transfer(&self, point: Point2<f64>) -> Option<Point2<f64>> {
        Point2::from_homogeneous(self.0 * point.to_homogeneous())
    }
}

impl Model<PixelMatch> for Homography {
    /// The forward transfer error in pixels.
    fn residual(&self, &[a, b]: &PixelMatch) -> f64 {
        self.transfer(a)
            .map(|transferred| (transferred - b).norm())
            .filter(|residual| residual.is_finite())
            .unwrap_or(f64::INFINITY)
    }
}

/// Performs the normalized four-point direct linear transform.
#[derive(Copy, Clone, Debug)]
pub struct FourPoint {
    pub epsilon: f64,
    pub iterations: usize,
}

impl FourPoint {
    pub fn new() -> Self {
        Default::default()
    }

    /// Estimates the homography from the first four matches of `data`.
    ///
    /// Returns `None` if there are fewer than four matches or if three of the
    /// points in either image are collinear.
    pub fn from_matches<I>(&self, data: I) -> Option<Homography>
    where
        I: Iterator<Item = PixelMatch>,
    {
        let mut a = [Point2::origin(); 4];
        let mut b = [Point2::origin(); 4];
        let mut count = 0;
        for (ix, [pa, pb]) in (0..4).zip(data) {
            a[ix] = pa;
            b[ix] = pb;
            count += 1;
        }
        if count < 4 {
            return None;
        }

        let (transform_a, normalized_a) = normalize(&a)?;
        let (transform_b, normalized_b) = normalize(&b)?;
        if is_degenerate(&normalized_a) || is_degenerate(&normalized_b) {
            return None;
        }

        let system = encode_transfer_equation(&normalized_a, &normalized_b);
        let h = null_vector(system.transpose() * system, self.epsilon, self.iterations)?;
        // The eigenvector holds H in row-major order.
        let normalized = Matrix3::from_iterator(h.iter().copied()).transpose();
        let mut homography = transform_b.try_inverse()? * normalized * transform_a;

        let scale = homography[(2, 2)];
        if scale.abs() > f64::EPSILON {
            homography /= scale;
        }
        if !homography.iter().all(|v| v.is_finite()) || homography.determinant().abs() < 1e-12 {
            return None;
        }
        Some(Homography(homography))
    }
}

impl Default for FourPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl Estimator<PixelMatch> for FourPoint {
    type Model = Homography;
    type ModelIter = Option<Homography>;
    const MIN_SAMPLES: usize = 4;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PixelMatch> + Clone,
    {
        self.from_matches(data)
    }
}

/// Each correspondence contributes two rows of `A * h = 0`.
fn encode_transfer_equation(a: &[Point2<f64>; 4], b: &[Point2<f64>; 4]) -> OMatrix<f64, U8, U9> {
    let mut out: OMatrix<f64, U8, U9> = nalgebra::zero();
    for (i, (pa, pb)) in a.iter().zip(b).enumerate() {
        let (x, y) = (pa.x, pa.y);
        let (xp, yp) = (pb.x, pb.y);
        let upper = 2 * i;
        let lower = 2 * i + 1;

        out[(upper, 0)] = -x;
        out[(upper, 1)] = -y;
        out[(upper, 2)] = -1.0;
        out[(upper, 6)] = xp * x;
        out[(upper, 7)] = xp * y;
        out[(upper, 8)] = xp;

        out[(lower, 3)] = -x;
        out[(lower, 4)] = -y;
        out[(lower, 5)] = -1.0;
        out[(lower, 6)] = yp * x;
        out[(lower, 7)] = yp * y;
        out[(lower, 8)] = yp;
    }
    out
}

/// Finds the eigenvector of the smallest eigenvalue of `ata`, the normal matrix of a
/// homogeneous linear system in nine unknowns.
///
/// Returns `None` if the null space is not one-dimensional, which is the case when the second
/// smallest eigenvalue is negligible next to the largest one.
pub fn null_vector(
    ata: OMatrix<f64, U9, U9>,
    epsilon: f64,
    iterations: usize,
) -> Option<OVector<f64, U9>> {
    let eigens = ata.try_symmetric_eigen(epsilon, iterations)?;
    let mut order: [usize; 9] = core::array::from_fn(|ix| ix);
    order.sort_unstable_by_key(|&ix| FloatOrd(eigens.eigenvalues[ix]));
    let largest = eigens.eigenvalues[order[8]];
    let second = eigens.eigenvalues[order[1]];
    if !(largest > 0.0) || second <= largest * 1e-10 {
        return None;
    }
    Some(eigens.eigenvectors.column(order[0]).into_owned())
}

/// Translates the points to their centroid and scales them to a mean distance of `sqrt(2)`.
///
/// Returns the similarity transform that was applied and the transformed points, or `None`
/// if all points coincide.
pub fn normalize<const N: usize>(
    points: &[Point2<f64>; N],
) -> Option<(Matrix3<f64>, [Point2<f64>; N])> {
    let centroid = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords)
        / N as f64;
    let mean_distance = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / N as f64;
    if !(mean_distance > f64::EPSILON) {
        return None;
    }
    let scale = core::f64::consts::SQRT_2 / mean_distance;
    #[rustfmt::skip]
    let transform = Matrix3::new(
        scale,  0.0,    -scale * centroid.x,
        0.0,    scale,  -scale * centroid.y,
        0.0,    0.0,    1.0,
    );
    let normalized = points.map(|p| Point2::from((p.coords - centroid) * scale));
    Some((transform, normalized))
}

/// Any three collinear points leave the transfer underdetermined.
fn is_degenerate(points: &[Point2<f64>; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let u = points[j] - points[i];
        let v = points[k] - points[i];
        (u.x * v.y - u.y * v.x).abs() < 1e-6
    })
}
