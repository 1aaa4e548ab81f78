//! Mean-variance portfolio optimizer.
//!
//! Maximizes `w·μ − λ·wᵀΣw` subject to `Σw = gross_exposure` and per-asset
//! weight bounds. The equality-constrained closed form is used when it lands
//! inside the bounds; otherwise projected gradient ascent with an exact
//! projection onto the bounded hyperplane.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::linalg::{cholesky, cholesky_solve, is_symmetric};

/// Bisection steps for the projection threshold.
const PROJECTION_STEPS: usize = 200;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Weight bounds cannot sum to {target}: feasible total is [{min_total}, {max_total}]")]
    InfeasibleConstraints {
        target: f64,
        min_total: f64,
        max_total: f64,
    },

    #[error("Covariance matrix is not symmetric positive-definite")]
    SingularCovariance,

    #[error("Dimension mismatch: expected {expected} assets, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("No assets to allocate")]
    NoAssets,

    #[error("Forecasts and covariance must be finite")]
    NonFiniteInput,

    #[error("Risk aversion must be positive and finite, got {0}")]
    InvalidRiskAversion(f64),

    #[error("Invalid weight bounds [{min}, {max}]")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Shrinkage intensity must be in [0, 1], got {0}")]
    InvalidShrinkage(f64),

    #[error("Need at least 2 return observations, got {0}")]
    InsufficientObservations(usize),
}

/// Inclusive bounds on a single weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl WeightBounds {
    pub const UNBOUNDED: Self = Self {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `[0, 1]`.
    pub fn long_only() -> Self {
        Self::new(0.0, 1.0)
    }

    pub fn contains(&self, w: f64, tolerance: f64) -> bool {
        w >= self.min - tolerance && w <= self.max + tolerance
    }

    fn clamp(&self, w: f64) -> f64 {
        w.max(self.min).min(self.max)
    }

    fn validate(&self) -> Result<(), OptimizerError> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(OptimizerError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// λ in `w·μ − λ·wᵀΣw`.
    pub risk_aversion: f64,
    /// Bounds applied to every asset; `None` leaves weights unbounded.
    pub bounds: Option<WeightBounds>,
    /// Per-asset overrides of `bounds`, keyed by asset id.
    pub asset_bounds: BTreeMap<String, WeightBounds>,
    /// Required sum of weights.
    pub gross_exposure: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest weight change per iteration.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 1.0,
            bounds: None,
            asset_bounds: BTreeMap::new(),
            gross_exposure: 1.0,
            max_iterations: 10_000,
            tolerance: 1e-10,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
            return Err(OptimizerError::InvalidRiskAversion(self.risk_aversion));
        }
        if let Some(bounds) = &self.bounds {
            bounds.validate()?;
        }
        for bounds in self.asset_bounds.values() {
            bounds.validate()?;
        }
        if !self.gross_exposure.is_finite() {
            return Err(OptimizerError::NonFiniteInput);
        }
        Ok(())
    }

    fn default_bounds(&self) -> WeightBounds {
        self.bounds.unwrap_or(WeightBounds::UNBOUNDED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMethod {
    ClosedForm,
    ProjectedGradient,
}

/// Optimal weights in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub weights: Array1<f64>,
    pub expected_return: f64,
    pub variance: f64,
    pub method: SolveMethod,
    pub iterations: usize,
    /// False if projected gradient hit `max_iterations`; the weights are
    /// still feasible.
    pub converged: bool,
}

/// Asset id to weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub weights: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub variance: f64,
    pub method: SolveMethod,
}

impl Portfolio {
    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.weights.get(asset).copied()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Portfolio ({:?})\nExpected Return: {:.6}\nVolatility: {:.6}\n",
            self.method,
            self.expected_return,
            self.variance.max(0.0).sqrt()
        );
        for (asset, w) in &self.weights {
            out.push_str(&format!("  {asset}: {:.2}%\n", w * 100.0));
        }
        out
    }
}

/// Mean-variance optimizer.
#[derive(Debug, Clone, Default)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize with the configured default bounds on every asset.
    pub fn optimize(&self, mu: ArrayView1<'_, f64>, cov: ArrayView2<'_, f64>) -> Result<Allocation, OptimizerError> {
        let bounds = vec![self.config.default_bounds(); mu.len()];
        self.optimize_with_bounds(mu, cov, &bounds)
    }

    /// Optimize for named assets, applying per-asset bound overrides.
    pub fn allocate(
        &self,
        assets: &[String],
        mu: ArrayView1<'_, f64>,
        cov: ArrayView2<'_, f64>,
    ) -> Result<Portfolio, OptimizerError> {
        if assets.len() != mu.len() {
            return Err(OptimizerError::DimensionMismatch {
                expected: assets.len(),
                got: mu.len(),
            });
        }
        let bounds: Vec<WeightBounds> = assets
            .iter()
            .map(|a| {
                self.config
                    .asset_bounds
                    .get(a)
                    .copied()
                    .unwrap_or_else(|| self.config.default_bounds())
            })
            .collect();
        let allocation = self.optimize_with_bounds(mu, cov, &bounds)?;
        Ok(Portfolio {
            weights: assets.iter().cloned().zip(allocation.weights.iter().copied()).collect(),
            expected_return: allocation.expected_return,
            variance: allocation.variance,
            method: allocation.method,
        })
    }

    /// Optimize with explicit per-asset bounds.
    pub fn optimize_with_bounds(
        &self,
        mu: ArrayView1<'_, f64>,
        cov: ArrayView2<'_, f64>,
        bounds: &[WeightBounds],
    ) -> Result<Allocation, OptimizerError> {
        self.config.validate()?;
        let n = mu.len();
        if n == 0 {
            return Err(OptimizerError::NoAssets);
        }
        if cov.nrows() != n || cov.ncols() != n {
            return Err(OptimizerError::DimensionMismatch {
                expected: n,
                got: cov.nrows().max(cov.ncols()),
            });
        }
        if bounds.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                expected: n,
                got: bounds.len(),
            });
        }
        if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
            return Err(OptimizerError::NonFiniteInput);
        }
        for b in bounds {
            b.validate()?;
        }

        let target = self.config.gross_exposure;
        let min_total: f64 = bounds.iter().map(|b| b.min).sum();
        let max_total: f64 = bounds.iter().map(|b| b.max).sum();
        let slack = self.config.tolerance.max(1e-12) * n as f64;
        if min_total > target + slack || max_total < target - slack {
            return Err(OptimizerError::InfeasibleConstraints {
                target,
                min_total,
                max_total,
            });
        }

        if !is_symmetric(cov) {
            return Err(OptimizerError::SingularCovariance);
        }
        let factor = cholesky(cov).ok_or(OptimizerError::SingularCovariance)?;

        let lambda = self.config.risk_aversion;
        let ones = Array1::<f64>::ones(n);
        let inv_mu = cholesky_solve(&factor, mu);
        let inv_ones = cholesky_solve(&factor, ones.view());
        let gamma = (inv_mu.sum() - 2.0 * lambda * target) / inv_ones.sum();
        let closed = (&inv_mu - &(&inv_ones * gamma)) / (2.0 * lambda);

        let tolerance = self.config.tolerance.max(1e-12);
        if closed.iter().zip(bounds).all(|(w, b)| b.contains(*w, tolerance)) {
            debug!("Closed-form allocation within bounds");
            return Ok(self.finish(closed, mu, cov, SolveMethod::ClosedForm, 0, true));
        }

        let (weights, iterations, converged) = self.projected_gradient(mu, cov, bounds, closed.view());
        if !converged {
            warn!(
                "Projected gradient stopped after {} iterations without converging",
                iterations
            );
        }
        Ok(self.finish(
            weights,
            mu,
            cov,
            SolveMethod::ProjectedGradient,
            iterations,
            converged,
        ))
    }

    fn projected_gradient(
        &self,
        mu: ArrayView1<'_, f64>,
        cov: ArrayView2<'_, f64>,
        bounds: &[WeightBounds],
        start: ArrayView1<'_, f64>,
    ) -> (Array1<f64>, usize, bool) {
        let lambda = self.config.risk_aversion;
        let target = self.config.gross_exposure;

        // Gershgorin bound on the largest eigenvalue of Σ.
        let spectral = cov
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max);
        let step = 1.0 / (2.0 * lambda * spectral);

        let mut w = project(start, bounds, target);
        for iteration in 1..=self.config.max_iterations {
            let grad = &mu - &(cov.dot(&w) * (2.0 * lambda));
            let next = project((&w + &(grad * step)).view(), bounds, target);
            let change = next
                .iter()
                .zip(w.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            w = next;
            if change < self.config.tolerance {
                debug!("Projected gradient converged after {} iterations", iteration);
                return (w, iteration, true);
            }
        }
        (w, self.config.max_iterations, false)
    }

    fn finish(
        &self,
        weights: Array1<f64>,
        mu: ArrayView1<'_, f64>,
        cov: ArrayView2<'_, f64>,
        method: SolveMethod,
        iterations: usize,
        converged: bool,
    ) -> Allocation {
        Allocation {
            expected_return: weights.dot(&mu),
            variance: weights.dot(&cov.dot(&weights)),
            weights,
            method,
            iterations,
            converged,
        }
    }
}

/// Euclidean projection of `v` onto `{w : Σw = target, min ≤ w ≤ max}`.
///
/// The projection is `clamp(v − τ)` for the unique τ that meets the sum,
/// found by bisection. Callers check feasibility first.
pub(crate) fn project(v: ArrayView1<'_, f64>, bounds: &[WeightBounds], target: f64) -> Array1<f64> {
    let total = |tau: f64| -> f64 {
        v.iter()
            .zip(bounds)
            .map(|(x, b)| b.clamp(x - tau))
            .sum()
    };

    let n = v.len().max(1) as f64;
    let guess = (v.sum() - target) / n;
    let mut width = guess.abs().max(1.0);

    // total(τ) is non-increasing in τ.
    let mut lo = guess - width;
    while total(lo) < target && width < f64::MAX / 4.0 {
        width *= 2.0;
        lo = guess - width;
    }
    let mut width = guess.abs().max(1.0);
    let mut hi = guess + width;
    while total(hi) > target && width < f64::MAX / 4.0 {
        width *= 2.0;
        hi = guess + width;
    }

    for _ in 0..PROJECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if total(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let tau = 0.5 * (lo + hi);
    v.iter().zip(bounds).map(|(x, b)| b.clamp(x - tau)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn optimizer(risk_aversion: f64, bounds: Option<WeightBounds>) -> PortfolioOptimizer {
        PortfolioOptimizer::new(OptimizerConfig {
            risk_aversion,
            bounds,
            ..Default::default()
        })
    }

    #[test]
    fn test_identity_closed_form() {
        let mu = array![0.1, 0.2];
        let cov = Array2::<f64>::eye(2);
        let alloc = optimizer(1.0, None).optimize(mu.view(), cov.view()).unwrap();

        // [0.5, 0.5] + 0.5 (μ − mean μ)
        assert_eq!(alloc.method, SolveMethod::ClosedForm);
        assert!((alloc.weights[0] - 0.475).abs() < 1e-12);
        assert!((alloc.weights[1] - 0.525).abs() < 1e-12);
        assert!((alloc.weights.sum() - 1.0).abs() < 1e-12);
        assert!((alloc.expected_return - 0.1525).abs() < 1e-12);
    }

    #[test]
    fn test_upper_bound_binds() {
        let mu = array![0.1, 0.2];
        let cov = Array2::<f64>::eye(2);
        let alloc = optimizer(1.0, Some(WeightBounds::new(0.0, 0.5)))
            .optimize(mu.view(), cov.view())
            .unwrap();
        assert_eq!(alloc.method, SolveMethod::ProjectedGradient);
        assert!(alloc.converged);
        assert!((alloc.weights[0] - 0.5).abs() < 1e-8);
        assert!((alloc.weights[1] - 0.5).abs() < 1e-8);
    }

    #[test]
    fn test_long_only_corner() {
        // Low risk aversion wants to short asset 0.
        let mu = array![0.1, 1.0];
        let cov = Array2::<f64>::eye(2);
        let alloc = optimizer(0.1, Some(WeightBounds::long_only()))
            .optimize(mu.view(), cov.view())
            .unwrap();
        assert_eq!(alloc.method, SolveMethod::ProjectedGradient);
        assert!(alloc.weights[0].abs() < 1e-8);
        assert!((alloc.weights[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_infeasible_bounds() {
        let mu = array![0.1, 0.2];
        let cov = Array2::<f64>::eye(2);
        let err = optimizer(1.0, Some(WeightBounds::new(0.0, 0.3)))
            .optimize(mu.view(), cov.view())
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InfeasibleConstraints { .. }));

        let err = optimizer(1.0, Some(WeightBounds::new(0.6, 1.0)))
            .optimize(mu.view(), cov.view())
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InfeasibleConstraints { .. }));
    }

    #[test]
    fn test_singular_covariance() {
        let mu = array![0.1, 0.2];
        let cov = array![[1.0, 1.0], [1.0, 1.0]];
        assert_eq!(
            optimizer(1.0, None).optimize(mu.view(), cov.view()).unwrap_err(),
            OptimizerError::SingularCovariance
        );

        let asymmetric = array![[1.0, 0.5], [0.0, 1.0]];
        assert_eq!(
            optimizer(1.0, None).optimize(mu.view(), asymmetric.view()).unwrap_err(),
            OptimizerError::SingularCovariance
        );
    }

    #[test]
    fn test_input_validation() {
        let cov = Array2::<f64>::eye(2);
        assert_eq!(
            optimizer(1.0, None).optimize(array![0.1].view(), cov.view()).unwrap_err(),
            OptimizerError::DimensionMismatch { expected: 1, got: 2 }
        );
        assert_eq!(
            optimizer(0.0, None).optimize(array![0.1, 0.2].view(), cov.view()).unwrap_err(),
            OptimizerError::InvalidRiskAversion(0.0)
        );
        assert_eq!(
            optimizer(1.0, None)
                .optimize(array![f64::NAN, 0.2].view(), cov.view())
                .unwrap_err(),
            OptimizerError::NonFiniteInput
        );
        assert_eq!(
            optimizer(1.0, None)
                .optimize(Array1::zeros(0).view(), Array2::zeros((0, 0)).view())
                .unwrap_err(),
            OptimizerError::NoAssets
        );
    }

    #[test]
    fn test_weights_valid_for_random_inputs() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = WeightBounds::new(0.05, 0.4);
        for _ in 0..25 {
            let n = rng.gen_range(3..7);
            let mu = Array1::from_shape_fn(n, |_| rng.gen_range(-0.2..0.3));
            let a = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
            let cov = a.t().dot(&a) + Array2::<f64>::eye(n) * 0.1;
            let lambda = rng.gen_range(0.1..5.0);

            let alloc = optimizer(lambda, Some(bounds)).optimize(mu.view(), cov.view()).unwrap();
            assert!((alloc.weights.sum() - 1.0).abs() < 1e-6);
            assert!(alloc.weights.iter().all(|w| bounds.contains(*w, 1e-6)));
        }
    }

    #[test]
    fn test_allocate_with_asset_overrides() {
        let mut asset_bounds = BTreeMap::new();
        asset_bounds.insert("bonds".to_string(), WeightBounds::new(0.3, 1.0));
        let opt = PortfolioOptimizer::new(OptimizerConfig {
            bounds: Some(WeightBounds::long_only()),
            asset_bounds,
            ..Default::default()
        });

        let assets = vec!["equity".to_string(), "bonds".to_string()];
        let portfolio = opt
            .allocate(&assets, array![1.0, 0.0].view(), Array2::<f64>::eye(2).view())
            .unwrap();
        assert!((portfolio.total_weight() - 1.0).abs() < 1e-8);
        assert!((portfolio.weight("bonds").unwrap() - 0.3).abs() < 1e-6);
        assert!((portfolio.weight("equity").unwrap() - 0.7).abs() < 1e-6);
        assert!(portfolio.summary().contains("equity"));
    }

    #[test]
    fn test_projection() {
        let bounds = [WeightBounds::long_only(); 3];
        let p = project(array![0.6, 0.6, -0.5].view(), &bounds, 1.0);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
        assert_eq!(p[2], 0.0);

        let free = [WeightBounds::UNBOUNDED; 2];
        let p = project(array![2.0, 0.0].view(), &free, 1.0);
        assert!((p[0] - 1.5).abs() < 1e-12);
        assert!((p[1] + 0.5).abs() < 1e-12);
    }
}
