//! 1-D Gaussian fitting of summed star profiles.
//!
//! Model: `f(x) = constant + amplitude * exp(-(x - mean)^2 / (2 * sigma^2))`,
//! solved with Levenberg-Marquardt from closed-form moment seeds.
//!
//! On a bright background the raw moments overestimate the width several
//! times over, so a second start is taken from the moments of the profile
//! above its minimum. The converged fit with the lower chi-squared wins.

use thiserror::Error;

use super::lm_optimizer::{LMConfig, LMModel, LMResult, optimize};

/// Smallest profile the 4-parameter model can be fit to.
const MIN_SAMPLES: usize = 4;

/// Lower bound on the fitted width, in sample units.
const MIN_SIGMA: f64 = 0.05;

/// A profile that could not be fit.
///
/// Callers treat every variant the same way; the reason is kept for logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("fit failed: x and y lengths differ ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },
    #[error("fit failed: {0} samples, need at least {MIN_SAMPLES}")]
    TooFewSamples(usize),
    #[error("fit failed: non-finite input sample")]
    NonFiniteInput,
    #[error("fit failed: profile sums to zero")]
    ZeroFlux,
    #[error("fit failed: initial guess is not finite")]
    NonFiniteSeed,
    #[error("fit failed: no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("fit failed: result is not finite")]
    NonFiniteResult,
}

/// Best-fit 1-D Gaussian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianProfile {
    pub constant: f64,
    pub amplitude: f64,
    /// Sub-sample position of the peak along the profile axis.
    pub mean: f64,
    pub sigma: f64,
}

impl GaussianProfile {
    fn from_params([constant, amplitude, mean, sigma]: [f64; 4]) -> Self {
        Self {
            constant,
            amplitude,
            mean,
            // Only sigma^2 enters the model
            sigma: sigma.abs(),
        }
    }

    fn to_params(self) -> [f64; 4] {
        [self.constant, self.amplitude, self.mean, self.sigma]
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let dx = x - self.mean;
        self.constant + self.amplitude * (-dx * dx / (2.0 * self.sigma * self.sigma)).exp()
    }

    /// Closed-form starting point: flux-weighted mean and spread, minimum as
    /// the baseline and maximum as the amplitude.
    pub fn seed(x: &[f64], y: &[f64]) -> Result<Self, FitError> {
        let constant = y.iter().copied().fold(f64::INFINITY, f64::min);
        let amplitude = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (mean, sigma) = weighted_moments(x, y.iter().copied())?;

        let seed = Self {
            constant,
            amplitude,
            mean,
            sigma,
        };
        if seed.to_params().iter().all(|p| p.is_finite()) {
            Ok(seed)
        } else {
            Err(FitError::NonFiniteSeed)
        }
    }

    /// Like [`Self::seed`], but with the moments taken over `y - min(y)` and
    /// the amplitude measured above that minimum. `None` for a flat profile.
    pub fn seed_above_baseline(x: &[f64], y: &[f64]) -> Option<Self> {
        let constant = y.iter().copied().fold(f64::INFINITY, f64::min);
        let peak = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (mean, sigma) = weighted_moments(x, y.iter().map(|&v| v - constant)).ok()?;

        let seed = Self {
            constant,
            amplitude: peak - constant,
            mean,
            sigma,
        };
        (seed.to_params().iter().all(|p| p.is_finite()) && seed.sigma > 0.0).then_some(seed)
    }
}

/// Mean and standard deviation of `x` weighted by `weights`.
fn weighted_moments(
    x: &[f64],
    weights: impl Iterator<Item = f64> + Clone,
) -> Result<(f64, f64), FitError> {
    let total: f64 = weights.clone().sum();
    if total == 0.0 {
        return Err(FitError::ZeroFlux);
    }

    let mean = x.iter().zip(weights.clone()).map(|(&xi, w)| xi * w).sum::<f64>() / total;
    let variance = x
        .iter()
        .zip(weights)
        .map(|(&xi, w)| w * (xi - mean) * (xi - mean))
        .sum::<f64>()
        / total;
    Ok((mean, variance.sqrt()))
}

/// Parameters: [constant, amplitude, mean, sigma]
///
/// Steps are kept to a non-negative amplitude, a mean inside the sampled
/// range and a width between [`MIN_SIGMA`] and that range.
#[derive(Debug)]
struct Gaussian1D {
    x_min: f64,
    x_max: f64,
}

impl Gaussian1D {
    fn over(x: &[f64]) -> Self {
        Self {
            x_min: x.iter().copied().fold(f64::INFINITY, f64::min),
            x_max: x.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn fit(&self, x: &[f64], y: &[f64], seed: GaussianProfile, config: &LMConfig) -> LMResult<4> {
        optimize(self, x, y, seed.to_params(), config)
    }
}

impl LMModel<4> for Gaussian1D {
    #[inline]
    fn evaluate(&self, x: f64, params: &[f64; 4]) -> f64 {
        let [constant, amplitude, mean, sigma] = *params;
        let dx = x - mean;
        constant + amplitude * (-dx * dx / (2.0 * sigma * sigma)).exp()
    }

    #[inline]
    fn jacobian_row(&self, x: f64, params: &[f64; 4]) -> [f64; 4] {
        let [_constant, amplitude, mean, sigma] = *params;
        let sigma2 = sigma * sigma;
        let dx = x - mean;
        let exp_val = (-dx * dx / (2.0 * sigma2)).exp();
        let amp_exp = amplitude * exp_val;

        [
            1.0,                                  // df/dconstant
            exp_val,                              // df/damplitude
            amp_exp * dx / sigma2,                // df/dmean
            amp_exp * dx * dx / (sigma2 * sigma), // df/dsigma
        ]
    }

    fn constrain(&self, params: &mut [f64; 4]) {
        let max_sigma = (self.x_max - self.x_min).max(MIN_SIGMA);
        params[1] = params[1].max(0.0);
        params[2] = params[2].clamp(self.x_min, self.x_max);
        params[3] = params[3].abs().clamp(MIN_SIGMA, max_sigma);
    }
}

/// Fit a 1-D Gaussian to the samples `(x, y)`.
///
/// [`GaussianProfile::seed`] must be usable; the baseline-subtracted start is
/// tried as well when it exists. Fails unless at least one start converges.
pub fn fit_gaussian_profile(
    x: &[f64],
    y: &[f64],
    config: &LMConfig,
) -> Result<GaussianProfile, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < MIN_SAMPLES {
        return Err(FitError::TooFewSamples(x.len()));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteInput);
    }

    let seed = GaussianProfile::seed(x, y)?;
    let model = Gaussian1D::over(x);

    let primary = model.fit(x, y, seed, config);
    let secondary = GaussianProfile::seed_above_baseline(x, y).map(|s| model.fit(x, y, s, config));

    let best = [Some(primary), secondary]
        .into_iter()
        .flatten()
        .filter(|r| r.converged)
        .min_by(|a, b| a.chi2.total_cmp(&b.chi2));

    let Some(result) = best else {
        return Err(FitError::NotConverged {
            iterations: primary.iterations,
        });
    };
    if result.params.iter().any(|p| !p.is_finite()) || result.params[3] == 0.0 {
        return Err(FitError::NonFiniteResult);
    }

    Ok(GaussianProfile::from_params(result.params))
}
