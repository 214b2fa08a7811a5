//! Two-view epipolar consistency on calibrated (normalized) coordinates.
//!
//! Hypotheses for `x2ᵀ E x1 = 0` come from the minimal five-point solver and
//! ARRSAC keeps the one with the largest consensus. Every hypothesis lies on
//! the essential manifold (two equal singular values, one zero).
//!
//! A camera that did not move has no epipolar geometry at all, so matches that
//! all stay put are explained by a static model instead.

use arrsac::Arrsac;
use log::{debug, trace};
use nalgebra as na;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use sample_consensus::{Consensus, Estimator, Model};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServoError};

pub const FIVE_POINT_SAMPLES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub enabled: bool,
    /// Inlier tolerance in pixels.
    pub threshold_px: f64,
    pub confidence: f64,
    /// Upper bound on the hypotheses ARRSAC keeps in flight.
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_px: 3.0,
            confidence: 0.999,
            max_iterations: 1000,
            seed: 0,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_px.is_finite() && self.threshold_px > 0.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "ransac threshold must be positive, got {}",
                self.threshold_px
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "ransac confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.max_iterations == 0 {
            return Err(ServoError::InvalidConfiguration(
                "ransac needs at least one iteration".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples needed to draw one all-inlier five-point set at `confidence`
    /// when half of the matches are inliers, capped by `max_iterations`.
    pub fn hypotheses(&self) -> usize {
        let w = 0.5f64.powi(FIVE_POINT_SAMPLES as i32);
        let k = ((1.0 - self.confidence).ln() / (1.0 - w).ln()).ceil();
        (k as usize).clamp(1, self.max_iterations)
    }
}

/// Calibrated correspondence, reference point first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedMatch(pub na::Vector2<f64>, pub na::Vector2<f64>);

/// `x2ᵀ E x1 = 0`, scaled to unit Frobenius norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EssentialMatrix(pub na::Matrix3<f64>);

impl EssentialMatrix {
    /// Singular values, largest first.
    pub fn singular_values(&self) -> na::Vector3<f64> {
        let mut s = self.0.singular_values();
        s.as_mut_slice().sort_by(|a, b| b.total_cmp(a));
        s
    }

    /// First-order geometric (Sampson) error, squared.
    pub fn sampson_error(&self, x1: &na::Vector2<f64>, x2: &na::Vector2<f64>) -> f64 {
        let e = &self.0;
        let h1 = na::Vector3::new(x1.x, x1.y, 1.0);
        let h2 = na::Vector3::new(x2.x, x2.y, 1.0);
        let ex1 = e * h1;
        let etx2 = e.transpose() * h2;
        let num = h2.dot(&ex1);
        let den = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
        if den <= f64::EPSILON {
            return if num.abs() <= f64::EPSILON { 0.0 } else { f64::INFINITY };
        }
        num * num / den
    }
}

impl Model<NormalizedMatch> for EssentialMatrix {
    fn residual(&self, data: &NormalizedMatch) -> f64 {
        self.sampson_error(&data.0, &data.1)
    }
}

/// Monomials in `x, y, z` up to degree three. The ten cubics come first so
/// that elimination expresses each of them in the ten lower-degree terms,
/// which form the basis of the quotient ring.
const MONOMIALS: [[u8; 3]; 20] = [
    [3, 0, 0],
    [2, 1, 0],
    [1, 2, 0],
    [0, 3, 0],
    [2, 0, 1],
    [1, 1, 1],
    [0, 2, 1],
    [1, 0, 2],
    [0, 1, 2],
    [0, 0, 3],
    [2, 0, 0],
    [1, 1, 0],
    [0, 2, 0],
    [1, 0, 1],
    [0, 1, 1],
    [0, 0, 2],
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    [0, 0, 0],
];
const NUM_CUBIC: usize = 10;
const BASIS_X: usize = 6;
const BASIS_ONE: usize = 9;

fn monomial_index(exponents: [u8; 3]) -> Option<usize> {
    MONOMIALS.iter().position(|m| *m == exponents)
}

/// Polynomial over [`MONOMIALS`]; terms above degree three are dropped.
#[derive(Debug, Clone, Copy)]
struct Poly([f64; 20]);

impl Poly {
    fn zero() -> Poly {
        Poly([0.0; 20])
    }

    /// `c[0]·x + c[1]·y + c[2]·z + c[3]`
    fn linear(c: [f64; 4]) -> Poly {
        let mut p = Poly::zero();
        p.0[16..20].copy_from_slice(&c);
        p
    }

    fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::zero();
        for (i, a) in self.0.iter().enumerate().filter(|(_, a)| **a != 0.0) {
            for (j, b) in other.0.iter().enumerate().filter(|(_, b)| **b != 0.0) {
                let (mi, mj) = (MONOMIALS[i], MONOMIALS[j]);
                if let Some(k) = monomial_index([mi[0] + mj[0], mi[1] + mj[1], mi[2] + mj[2]]) {
                    out.0[k] += a * b;
                }
            }
        }
        out
    }

    fn add(&self, other: &Poly) -> Poly {
        Poly(std::array::from_fn(|k| self.0[k] + other.0[k]))
    }

    fn sub(&self, other: &Poly) -> Poly {
        Poly(std::array::from_fn(|k| self.0[k] - other.0[k]))
    }

    fn scale(&self, s: f64) -> Poly {
        Poly(self.0.map(|c| c * s))
    }
}

/// The ten cubic constraints on `E = x·N0 + y·N1 + z·N2 + N3`:
/// `det(E) = 0` and `(E Eᵀ - ½ tr(E Eᵀ) I) E = 0`.
fn essential_constraints(e: &[[Poly; 3]; 3]) -> na::SMatrix<f64, 10, 20> {
    let det = e[2][0]
        .mul(&e[0][1].mul(&e[1][2]).sub(&e[0][2].mul(&e[1][1])))
        .add(&e[2][1].mul(&e[0][2].mul(&e[1][0]).sub(&e[0][0].mul(&e[1][2]))))
        .add(&e[2][2].mul(&e[0][0].mul(&e[1][1]).sub(&e[0][1].mul(&e[1][0]))));

    let mut eet = [[Poly::zero(); 3]; 3];
    for i in 0..3 {
        for j in i..3 {
            let p = (0..3).fold(Poly::zero(), |acc, k| acc.add(&e[i][k].mul(&e[j][k])));
            eet[i][j] = p;
            eet[j][i] = p;
        }
    }
    let half_trace = eet[0][0].add(&eet[1][1]).add(&eet[2][2]).scale(0.5);
    for (i, row) in eet.iter_mut().enumerate() {
        row[i] = row[i].sub(&half_trace);
    }

    let mut m = na::SMatrix::<f64, 10, 20>::zeros();
    for (k, c) in det.0.iter().enumerate() {
        m[(0, k)] = *c;
    }
    for i in 0..3 {
        for j in 0..3 {
            let p = (0..3).fold(Poly::zero(), |acc, k| acc.add(&eet[i][k].mul(&e[k][j])));
            for (k, c) in p.0.iter().enumerate() {
                m[(1 + 3 * i + j, k)] = *c;
            }
        }
    }
    m
}

/// Right singular vector of the smallest singular value.
fn null_vector(m: &na::SMatrix<f64, 10, 10>) -> Option<na::SVector<f64, 10>> {
    let svd = m.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(idx).transpose())
}

/// Minimal solver (Stewénius action matrix). Returns every real solution,
/// up to ten, for exactly five correspondences.
pub fn five_point(sample: &[NormalizedMatch]) -> Vec<EssentialMatrix> {
    if sample.len() != FIVE_POINT_SAMPLES {
        return Vec::new();
    }
    let mut a = na::SMatrix::<f64, 9, 9>::zeros();
    for (r, NormalizedMatch(p1, p2)) in sample.iter().enumerate() {
        let x1 = na::Vector3::new(p1.x, p1.y, 1.0);
        let x2 = na::Vector3::new(p2.x, p2.y, 1.0);
        for k in 0..9 {
            a[(r, k)] = x2[k / 3] * x1[k % 3];
        }
    }
    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Vec::new();
    };
    let mut order: [usize; 9] = std::array::from_fn(|i| i);
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    let basis: [na::SVector<f64, 9>; 4] = std::array::from_fn(|k| v_t.row(order[k]).transpose());

    let e: [[Poly; 3]; 3] = std::array::from_fn(|r| {
        std::array::from_fn(|c| {
            let k = 3 * r + c;
            Poly::linear([basis[0][k], basis[1][k], basis[2][k], basis[3][k]])
        })
    });
    let constraints = essential_constraints(&e);
    let cubic = constraints.fixed_view::<10, 10>(0, 0).into_owned();
    let lower = constraints.fixed_view::<10, 10>(0, NUM_CUBIC).into_owned();
    let Some(reduced) = cubic.full_piv_lu().solve(&lower) else {
        trace!("five-point elimination is singular");
        return Vec::new();
    };

    // multiplication by x on the quotient basis
    let mut action = na::SMatrix::<f64, 10, 10>::zeros();
    for j in 0..10 {
        let b = MONOMIALS[NUM_CUBIC + j];
        let Some(k) = monomial_index([b[0] + 1, b[1], b[2]]) else {
            continue;
        };
        if k < NUM_CUBIC {
            action.set_row(j, &(-reduced.row(k)));
        } else {
            action[(j, k - NUM_CUBIC)] = 1.0;
        }
    }

    let identity = na::SMatrix::<f64, 10, 10>::identity();
    action
        .complex_eigenvalues()
        .iter()
        .filter(|l| l.im.abs() <= 1e-9 * (1.0 + l.re.abs()))
        .filter_map(|l| null_vector(&(action - identity * l.re)))
        .filter(|v| v[BASIS_ONE].abs() > 1e-12)
        .filter_map(|v| {
            let w = v[BASIS_ONE];
            let (x, y, z) = (v[BASIS_X] / w, v[BASIS_X + 1] / w, v[BASIS_X + 2] / w);
            let ev = basis[0] * x + basis[1] * y + basis[2] * z + basis[3];
            let m = na::Matrix3::from_row_slice(ev.as_slice());
            let norm = m.norm();
            (norm.is_finite() && norm > f64::EPSILON).then(|| EssentialMatrix(m / norm))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FivePoint;

impl Estimator<NormalizedMatch> for FivePoint {
    type Model = EssentialMatrix;
    type ModelIter = Vec<EssentialMatrix>;
    const MIN_SAMPLES: usize = FIVE_POINT_SAMPLES;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = NormalizedMatch> + Clone,
    {
        let sample: Vec<_> = data.take(FIVE_POINT_SAMPLES).collect();
        five_point(&sample)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpipolarModel {
    /// Every inlier stayed within the threshold of where it was.
    Static,
    Essential(EssentialMatrix),
}

#[derive(Debug, Clone)]
pub struct EpipolarEstimate {
    pub model: EpipolarModel,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
}

impl EpipolarEstimate {
    fn from_indices(model: EpipolarModel, indices: impl IntoIterator<Item = usize>, n: usize) -> Self {
        let mut inliers = vec![false; n];
        for i in indices {
            if let Some(flag) = inliers.get_mut(i) {
                *flag = true;
            }
        }
        let num_inliers = inliers.iter().filter(|&&i| i).count();
        EpipolarEstimate {
            model,
            inliers,
            num_inliers,
        }
    }
}

/// ARRSAC over five-point hypotheses.
pub struct EpipolarRansac {
    config: RansacConfig,
}

impl EpipolarRansac {
    pub fn new(config: RansacConfig) -> Result<EpipolarRansac> {
        config.validate()?;
        Ok(EpipolarRansac { config })
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// `pts1`/`pts2` are normalized coordinates, `focal` converts the pixel
    /// threshold onto the normalized plane. Returns `None` below five points
    /// or when no hypothesis could be formed.
    pub fn estimate(
        &self,
        pts1: &[na::Vector2<f64>],
        pts2: &[na::Vector2<f64>],
        focal: f64,
    ) -> Option<EpipolarEstimate> {
        let n = pts1.len();
        if n < FIVE_POINT_SAMPLES || pts2.len() != n {
            return None;
        }
        let threshold = self.config.threshold_px / focal;
        let threshold_sq = threshold * threshold;

        let still = pts1
            .iter()
            .zip(pts2.iter())
            .enumerate()
            .filter(|(_, (a, b))| (*b - *a).norm_squared() < threshold_sq)
            .map(|(i, _)| i);
        let stationary = EpipolarEstimate::from_indices(EpipolarModel::Static, still, n);
        if stationary.num_inliers == n {
            debug!("epipolar check: no match moved more than {:.1}px", self.config.threshold_px);
            return Some(stationary);
        }

        let matches: Vec<_> = pts1
            .iter()
            .zip(pts2.iter())
            .map(|(a, b)| NormalizedMatch(*a, *b))
            .collect();
        let rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        let mut arrsac =
            Arrsac::new(threshold_sq, rng).max_candidate_hypotheses(self.config.hypotheses());
        let essential = arrsac
            .model_inliers(&FivePoint, matches.iter().copied())
            .map(|(e, inliers)| {
                EpipolarEstimate::from_indices(EpipolarModel::Essential(e), inliers, n)
            });

        let best = match essential {
            Some(e) if e.num_inliers > stationary.num_inliers || stationary.num_inliers == 0 => e,
            None if stationary.num_inliers == 0 => return None,
            _ => stationary,
        };
        debug!(
            "epipolar check: {}/{} inliers, {}",
            best.num_inliers,
            n,
            match best.model {
                EpipolarModel::Static => "static",
                EpipolarModel::Essential(_) => "essential",
            }
        );
        Some(best)
    }
}
