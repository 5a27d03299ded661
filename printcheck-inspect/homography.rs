//! Projective transform estimation between two image planes.
//!
//! Normalized DLT on ≥4 correspondences, wrapped in a seeded RANSAC that
//! refits on the final consensus set.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use thiserror::Error;

/// Correspondences needed for a unique homography
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HomographyError {
    #[error("too few correspondences: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("point lists differ in length: {src} source vs {dst} destination")]
    LengthMismatch { src: usize, dst: usize },
    #[error("degenerate point configuration or singular transform")]
    Degenerate,
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
}

/// Map `p` through `h`; `None` when the point lands on the line at infinity
pub fn project(h: &Matrix3<f64>, p: [f64; 2]) -> Option<[f64; 2]> {
    let q = h * Vector3::new(p[0], p[1], 1.0);
    if q[2].abs() < 1e-12 {
        return None;
    }
    Some([q[0] / q[2], q[1] / q[2]])
}

fn squared_transfer_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    match project(h, src) {
        Some(p) => (p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2),
        None => f64::INFINITY,
    }
}

/// Similarity moving the centroid to the origin with mean radius sqrt(2)
fn conditioning_transform(pts: &[[f64; 2]]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p[0], ay + p[1]));
    let (cx, cy) = (sx / n, sy / n);
    let mean_radius = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
    let s = if mean_radius > 1e-12 {
        std::f64::consts::SQRT_2 / mean_radius
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply_affine(t: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    [t[(0, 0)] * p[0] + t[(0, 2)], t[(1, 1)] * p[1] + t[(1, 2)]]
}

/// Reject transforms that cannot be used for warping
fn is_usable(h: &Matrix3<f64>) -> bool {
    h.iter().all(|v| v.is_finite()) && h.determinant().abs() > 1e-10
}

/// Direct linear transform from ≥4 correspondences, `dst ≈ project(H, src)`.
///
/// The result is scaled so that `H[(2, 2)] == 1` whenever that entry is non-zero.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch { src: src.len(), dst: dst.len() });
    }
    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints { needed: MIN_CORRESPONDENCES, got: n });
    }

    let t_src = conditioning_transform(src);
    let t_dst = conditioning_transform(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (&s, &d)) in src.iter().zip(dst).enumerate() {
        let [x, y] = apply_affine(&t_src, s);
        let [u, v] = apply_affine(&t_dst, d);
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        a[(r, 8)] = -u;
        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        a[(r + 1, 8)] = -v;
    }

    // Null vector of A = eigenvector of AᵀA with the smallest eigenvalue
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let smallest = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, l), (_, r)| l.abs().total_cmp(&r.abs()))
        .map(|(i, _)| i)
        .ok_or(HomographyError::Degenerate)?;
    let h_cond = Matrix3::from_fn(|r, c| eig.eigenvectors[(3 * r + c, smallest)]);

    let t_dst_inv = t_dst.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h = t_dst_inv * h_cond * t_src;
    let w = h[(2, 2)];
    if w.abs() > 1e-12 {
        h /= w;
    }

    if is_usable(&h) {
        Ok(h)
    } else {
        Err(HomographyError::Degenerate)
    }
}

/// RANSAC settings for [`find_homography`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacParams {
    /// Upper bound on sampled hypotheses
    pub max_iterations: usize,
    /// Inlier distance in destination pixels
    pub reproj_threshold: f64,
    /// Probability of drawing at least one all-inlier sample, used to stop early
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            reproj_threshold: 5.0,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// Homography with its consensus set
#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub matrix: Matrix3<f64>,
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

/// Hypotheses needed to reach `confidence` with the observed inlier ratio
fn required_iterations(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    let all_inlier = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if all_inlier >= 1.0 - f64::EPSILON {
        return 1;
    }
    if all_inlier <= f64::EPSILON {
        return cap;
    }
    let n = (1.0 - confidence).ln() / (1.0 - all_inlier).ln();
    if n.is_finite() {
        (n.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

/// Any three of the four sample points (nearly) collinear
fn is_degenerate_sample(pts: &[[f64; 2]; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        cross.abs() < 1e-6
    })
}

fn consensus(h: &Matrix3<f64>, src: &[[f64; 2]], dst: &[[f64; 2]], threshold_sq: f64) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| squared_transfer_error(h, s, d) <= threshold_sq)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Robust homography `src → dst`, tolerant to outlying correspondences.
///
/// Hypotheses come from random minimal samples (seeded, so runs repeat
/// exactly); the best consensus set is refit with [`estimate_dlt`].
pub fn find_homography(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    params: &RansacParams,
) -> Result<HomographyFit, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch { src: src.len(), dst: dst.len() });
    }
    let n = src.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints { needed: MIN_CORRESPONDENCES, got: n });
    }

    let threshold_sq = params.reproj_threshold * params.reproj_threshold;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Matrix3<f64>, usize)> = None;
    let mut budget = params.max_iterations.max(1);
    let mut iteration = 0;

    while iteration < budget {
        iteration += 1;

        let picked = index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let mut s4 = [[0.0; 2]; 4];
        let mut d4 = [[0.0; 2]; 4];
        for (slot, idx) in picked.iter().enumerate() {
            s4[slot] = src[idx];
            d4[slot] = dst[idx];
        }
        if is_degenerate_sample(&s4) || is_degenerate_sample(&d4) {
            continue;
        }

        let Ok(h) = estimate_dlt(&s4, &d4) else {
            continue;
        };
        let (_, count) = consensus(&h, src, dst, threshold_sq);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((h, count));
            budget = budget.min(required_iterations(
                count as f64 / n as f64,
                params.confidence,
                params.max_iterations.max(1),
            ));
        }
    }

    let (sample_h, sample_count) = best.ok_or(HomographyError::Degenerate)?;
    if sample_count < MIN_CORRESPONDENCES {
        return Err(HomographyError::InsufficientInliers {
            needed: MIN_CORRESPONDENCES,
            found: sample_count,
        });
    }

    let (mask, _) = consensus(&sample_h, src, dst, threshold_sq);
    let (in_src, in_dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = src
        .iter()
        .zip(dst)
        .zip(&mask)
        .filter(|(_, keep)| **keep)
        .map(|((&s, &d), _)| (s, d))
        .unzip();

    // A refit that loses support falls back to the sampled model
    let matrix = match estimate_dlt(&in_src, &in_dst) {
        Ok(refit) if consensus(&refit, src, dst, threshold_sq).1 >= sample_count => refit,
        _ => sample_h,
    };
    let (inliers, inlier_count) = consensus(&matrix, src, dst, threshold_sq);

    Ok(HomographyFit { matrix, inliers, inlier_count })
}
