//! Levenberg-Marquardt optimizer for 1-D profile fitting.
//!
//! Generic over the number of model parameters. Uses f64 throughout. The
//! damping term is `lambda * D_i`, where `D_i` is the largest `H_ii` seen so
//! far, so a parameter whose curvature collapses on the current step is
//! still damped on the scale it had earlier.

use serde::{Deserialize, Serialize};

use crate::math::solve;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMConfig {
    /// Maximum iterations. Hitting the limit counts as a failed fit.
    pub max_iterations: usize,
    /// Relative step tolerance: an accepted step with
    /// `|delta| < xtol * (|p| + xtol)` (Euclidean norms) converges.
    pub xtol: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
    /// Damping above which no descent direction is left; the current
    /// parameters are taken as the minimum.
    pub max_lambda: f64,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            xtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
        }
    }
}

impl LMConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("fit.max_iterations must be at least 1".to_string());
        }
        if !(self.xtol > 0.0) {
            return Err(format!("fit.xtol must be positive, got {}", self.xtol));
        }
        if !(self.initial_lambda > 0.0) {
            return Err(format!(
                "fit.initial_lambda must be positive, got {}",
                self.initial_lambda
            ));
        }
        if !(self.lambda_up > 1.0) {
            return Err(format!("fit.lambda_up must be > 1, got {}", self.lambda_up));
        }
        if !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(format!(
                "fit.lambda_down must be in (0, 1), got {}",
                self.lambda_down
            ));
        }
        if !(self.max_lambda > self.initial_lambda) {
            return Err(format!(
                "fit.max_lambda must exceed initial_lambda, got {}",
                self.max_lambda
            ));
        }
        Ok(())
    }
}

/// Result of L-M optimization.
#[derive(Debug, Clone, Copy)]
pub struct LMResult<const N: usize> {
    pub params: [f64; N],
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// A model `z = f(x; params)` that can be fit with L-M optimization.
pub trait LMModel<const N: usize> {
    /// Evaluate the model at `x`.
    fn evaluate(&self, x: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives of the model at `x` with respect to each parameter.
    fn jacobian_row(&self, x: f64, params: &[f64; N]) -> [f64; N];

    /// Apply parameter constraints after an update.
    fn constrain(&self, params: &mut [f64; N]);
}

/// Run L-M optimization of `model` against samples `(data_x, data_z)`.
pub fn optimize<const N: usize, M: LMModel<N>>(
    model: &M,
    data_x: &[f64],
    data_z: &[f64],
    initial_params: [f64; N],
    config: &LMConfig,
) -> LMResult<N> {
    debug_assert_eq!(data_x.len(), data_z.len());

    let mut params = initial_params;
    let mut lambda = config.initial_lambda;
    let mut prev_chi2 = compute_chi2(model, data_x, data_z, &params);
    let mut converged = false;
    let mut iterations = 0;

    if !prev_chi2.is_finite() {
        return LMResult {
            params,
            chi2: prev_chi2,
            converged,
            iterations,
        };
    }

    let n = data_x.len();
    let mut jacobian = Vec::with_capacity(n);
    let mut residuals = Vec::with_capacity(n);
    let mut damping_scale = [0.0f64; N];

    'outer: for iter in 0..config.max_iterations {
        iterations = iter + 1;

        if prev_chi2 == 0.0 {
            converged = true;
            break;
        }

        fill_jacobian_residuals(
            model,
            data_x,
            data_z,
            &params,
            &mut jacobian,
            &mut residuals,
        );
        let (hessian, gradient) = compute_hessian_gradient(&jacobian, &residuals);

        for (i, scale) in damping_scale.iter_mut().enumerate() {
            *scale = scale.max(hessian[i][i]);
        }

        let delta = loop {
            let mut damped_hessian = hessian;
            for (i, row) in damped_hessian.iter_mut().enumerate() {
                row[i] += lambda * damping_scale[i];
            }

            if let Some(delta) = solve(&damped_hessian, &gradient) {
                break delta;
            }

            lambda *= config.lambda_up;
            if lambda > config.max_lambda {
                // Singular at every damping: no descent direction is left.
                converged = true;
                break 'outer;
            }
        };

        let mut new_params = params;
        for (p, d) in new_params.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        model.constrain(&mut new_params);

        let new_chi2 = compute_chi2(model, data_x, data_z, &new_params);

        if new_chi2 < prev_chi2 {
            let step_norm = norm(params.iter().zip(new_params.iter()).map(|(&a, &b)| b - a));
            let small_step = step_norm < config.xtol * (norm(params.iter().copied()) + config.xtol);

            params = new_params;
            lambda *= config.lambda_down;
            prev_chi2 = new_chi2;

            if small_step {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > config.max_lambda {
                // No damping finds a descent direction: already at the minimum.
                converged = true;
                break;
            }
        }
    }

    LMResult {
        params,
        chi2: prev_chi2,
        converged,
        iterations,
    }
}

fn norm(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

fn compute_chi2<const N: usize, M: LMModel<N>>(
    model: &M,
    data_x: &[f64],
    data_z: &[f64],
    params: &[f64; N],
) -> f64 {
    data_x
        .iter()
        .zip(data_z.iter())
        .map(|(&x, &z)| {
            let residual = z - model.evaluate(x, params);
            residual * residual
        })
        .sum()
}

/// Fill jacobian and residuals buffers, reusing existing allocations.
fn fill_jacobian_residuals<const N: usize, M: LMModel<N>>(
    model: &M,
    data_x: &[f64],
    data_z: &[f64],
    params: &[f64; N],
    jacobian: &mut Vec<[f64; N]>,
    residuals: &mut Vec<f64>,
) {
    jacobian.clear();
    residuals.clear();

    for (&x, &z) in data_x.iter().zip(data_z.iter()) {
        jacobian.push(model.jacobian_row(x, params));
        residuals.push(z - model.evaluate(x, params));
    }
}

/// Compute Hessian (J^T J) and gradient (J^T r).
/// Only the upper triangle is accumulated, then mirrored.
#[allow(clippy::needless_range_loop)]
fn compute_hessian_gradient<const N: usize>(
    jacobian: &[[f64; N]],
    residuals: &[f64],
) -> ([[f64; N]; N], [f64; N]) {
    let mut hessian = [[0.0f64; N]; N];
    let mut gradient = [0.0f64; N];

    for (row, &r) in jacobian.iter().zip(residuals.iter()) {
        for i in 0..N {
            gradient[i] += row[i] * r;
            for j in i..N {
                hessian[i][j] += row[i] * row[j];
            }
        }
    }

    for i in 1..N {
        for j in 0..i {
            hessian[i][j] = hessian[j][i];
        }
    }

    (hessian, gradient)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// z = a * x + b
    struct Line;

    impl LMModel<2> for Line {
        fn evaluate(&self, x: f64, params: &[f64; 2]) -> f64 {
            params[0] * x + params[1]
        }

        fn jacobian_row(&self, x: f64, _params: &[f64; 2]) -> [f64; 2] {
            [x, 1.0]
        }

        fn constrain(&self, _params: &mut [f64; 2]) {}
    }

    /// z = exp(-k * x)
    struct Decay;

    impl LMModel<1> for Decay {
        fn evaluate(&self, x: f64, params: &[f64; 1]) -> f64 {
            (-params[0] * x).exp()
        }

        fn jacobian_row(&self, x: f64, params: &[f64; 1]) -> [f64; 1] {
            [-x * (-params[0] * x).exp()]
        }

        fn constrain(&self, params: &mut [f64; 1]) {
            params[0] = params[0].max(0.0);
        }
    }

    /// z = (a + b) * x, only the sum is identifiable
    struct RedundantSlope;

    impl LMModel<2> for RedundantSlope {
        fn evaluate(&self, x: f64, params: &[f64; 2]) -> f64 {
            (params[0] + params[1]) * x
        }

        fn jacobian_row(&self, x: f64, _params: &[f64; 2]) -> [f64; 2] {
            [x, x]
        }

        fn constrain(&self, _params: &mut [f64; 2]) {}
    }

    #[test]
    fn test_linear_model_recovers_parameters() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let zs: Vec<f64> = xs.iter().map(|x| 2.5 * x - 1.0).collect();

        let result = optimize(&Line, &xs, &zs, [0.0, 0.0], &LMConfig::default());

        assert!(result.converged);
        assert!((result.params[0] - 2.5).abs() < 1e-8);
        assert!((result.params[1] + 1.0).abs() < 1e-8);
        assert!(result.chi2 < 1e-12);
    }

    #[test]
    fn test_nonlinear_model_recovers_parameter() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let zs: Vec<f64> = xs.iter().map(|x| (-0.7 * x).exp()).collect();

        let result = optimize(&Decay, &xs, &zs, [0.3], &LMConfig::default());

        assert!(result.converged);
        assert!((result.params[0] - 0.7).abs() < 1e-8);
    }

    #[test]
    fn test_iteration_limit_is_not_convergence() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let zs: Vec<f64> = xs.iter().map(|x| (-0.7 * x).exp()).collect();
        let config = LMConfig {
            max_iterations: 1,
            ..Default::default()
        };

        let result = optimize(&Decay, &xs, &zs, [0.3], &config);

        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_singular_step_raises_damping() {
        let xs: Vec<f64> = (1..10).map(|i| i as f64).collect();
        let zs: Vec<f64> = xs.iter().map(|x| 2.5 * x).collect();
        // Too little damping to make J^T J solvable on the first try
        let config = LMConfig {
            initial_lambda: 1e-20,
            ..Default::default()
        };

        let result = optimize(&RedundantSlope, &xs, &zs, [0.0, 0.0], &config);

        assert!(result.converged);
        assert!((result.params[0] + result.params[1] - 2.5).abs() < 1e-8);
    }

    #[test]
    fn test_constraint_is_applied_after_each_step() {
        // The best unconstrained decay rate is negative; the model clamps it at zero
        let xs: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        let zs: Vec<f64> = xs.iter().map(|x| (0.5 * x).exp()).collect();

        let result = optimize(&Decay, &xs, &zs, [0.3], &LMConfig::default());

        assert!(result.converged);
        assert_eq!(result.params[0], 0.0);
    }

    #[test]
    fn test_non_finite_start_is_not_convergence() {
        let xs = [0.0, 1.0, 2.0];
        let zs = [1.0, f64::NAN, 3.0];

        let result = optimize(&Line, &xs, &zs, [1.0, 0.0], &LMConfig::default());

        assert!(!result.converged);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(LMConfig::default().validate().is_ok());
        let bad = LMConfig {
            lambda_down: 2.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
