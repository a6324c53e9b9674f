//! Control-point initialization for [`LearnableFunction`](super::LearnableFunction)s.
//!
//! Ordinary Xavier/Kaiming initialization assumes linear weights. A spline's
//! effective sensitivity differs per control point because each basis function
//! has localized support, so the variance-preserving scheme here estimates a
//! per-control-point standard deviation from the second moments of the basis
//! functions themselves.

use log::debug;
use rand::distributions::Distribution;
use rand::{thread_rng, Rng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::fmt;
use std::str::FromStr;
use strum::EnumIter;

use super::{clamped_knots, full_basis_values, linspace};

/// number of standard-normal draws used to estimate the basis moments
const MOMENT_SAMPLE_COUNT: usize = 10_000;
/// finite-difference step for the basis-derivative moment estimate
const MOMENT_FD_STEP: f64 = 1e-4;
const VARIANCE_GAIN: f64 = 1.0;

/// How the control points of a new [`LearnableFunction`](super::LearnableFunction) are drawn.
///
/// Interactive hosts often persist this as a bare number ("noise amplitude")
/// or a scheme name; the [`FromStr`] impl accepts both forms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, EnumIter)]
pub enum InitScheme {
    /// control point `i` is drawn i.i.d. from `U(-amplitude / 2, amplitude / 2)`.
    /// An amplitude of 0 yields an identically-zero function
    FixedNoise(f64),
    /// an (anti-)identity ramp: control points interpolate linearly from
    /// `-limit` to `+limit` with `limit = sqrt(2 / fan_in)`, with a 50% chance
    /// of the slope being negated
    Linear,
    /// the basis-agnostic Glorot-like scheme: control point `m` is drawn from a
    /// zero-mean Gaussian whose standard deviation is derived from Monte-Carlo
    /// estimates of `E[B_m(x)^2]` and `E[B_m'(x)^2]` under standard-normal
    /// inputs clamped into the domain
    BasisAware,
}

impl Default for InitScheme {
    fn default() -> Self {
        InitScheme::BasisAware
    }
}

impl InitScheme {
    /// draw the `grid_size + 1` control points for one function.
    ///
    /// `degree` must already be clamped to `grid_size - 1`. The moment cache is
    /// only consulted by [`InitScheme::BasisAware`]; estimating the moments
    /// costs `O(samples * control points)`, so the cache matters when a network
    /// builds many edges sharing one `(grid_size, degree, domain)` configuration
    pub(crate) fn sample_control_points(
        &self,
        grid_size: usize,
        degree: usize,
        domain: (f64, f64),
        fan_in: usize,
        fan_out: usize,
        moment_cache: &mut MomentCache,
        rng: &mut impl Rng,
    ) -> Vec<f64> {
        let num_control_points = grid_size + 1;
        match self {
            InitScheme::FixedNoise(amplitude) => (0..num_control_points)
                .map(|_| {
                    if *amplitude > 0.0 {
                        rng.gen_range(-amplitude / 2.0..amplitude / 2.0)
                    } else {
                        0.0
                    }
                })
                .collect(),
            InitScheme::Linear => {
                if num_control_points < 2 {
                    return vec![0.0; num_control_points];
                }
                let limit = (2.0 / fan_in.max(1) as f64).sqrt();
                let mut ramp = linspace(-limit, limit, num_control_points);
                if rng.gen_bool(0.5) {
                    ramp.reverse();
                }
                ramp
            }
            InitScheme::BasisAware => {
                let (mu0, mu1) = moment_cache.moments(grid_size, degree, domain);
                let d = num_control_points as f64;
                (0..num_control_points)
                    .map(|m| {
                        let denominator = fan_in as f64 * mu0[m] + fan_out as f64 * mu1[m];
                        let sigma = if denominator > 0.0 {
                            VARIANCE_GAIN * ((1.0 / d) * (2.0 / denominator)).sqrt()
                        } else {
                            // standard Glorot bound when the basis moments carry no signal
                            (2.0 / (fan_in + fan_out) as f64).sqrt()
                        };
                        Normal::new(0.0, sigma)
                            .expect("unable to create normal distribution")
                            .sample(rng)
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Display for InitScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitScheme::FixedNoise(amplitude) => write!(f, "{}", amplitude),
            InitScheme::Linear => write!(f, "linear"),
            InitScheme::BasisAware => write!(f, "basis-aware"),
        }
    }
}

impl FromStr for InitScheme {
    type Err = ParseInitSchemeError;

    /// parse a scheme from the "number or name" form hosts persist: a numeric
    /// string is a [`InitScheme::FixedNoise`] amplitude; `"linear"` and
    /// `"basis-aware"` select the named schemes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(amplitude) = trimmed.parse::<f64>() {
            return Ok(InitScheme::FixedNoise(amplitude));
        }
        match trimmed {
            "linear" => Ok(InitScheme::Linear),
            "basis-aware" => Ok(InitScheme::BasisAware),
            _ => Err(ParseInitSchemeError {
                input: s.to_string(),
            }),
        }
    }
}

/// the string parsed as an [`InitScheme`] was neither a number nor a known scheme name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInitSchemeError {
    /// the offending input
    pub input: String,
}

impl fmt::Display for ParseInitSchemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a noise amplitude, 'linear', or 'basis-aware'",
            self.input
        )
    }
}

impl std::error::Error for ParseInitSchemeError {}

/// Memoized Monte-Carlo basis moments, keyed by `(grid_size, degree, domain)`.
///
/// Every function sharing a configuration has identical knot vectors and
/// therefore identical basis moments, so a network build passes one cache
/// through all of its edge constructions and pays the sampling cost once
#[derive(Debug, Default)]
pub struct MomentCache {
    moments: FxHashMap<(usize, usize, u64, u64), (Vec<f64>, Vec<f64>)>,
}

impl MomentCache {
    /// the `(E[B_m(x)^2], E[B_m'(x)^2])` vectors for the given configuration,
    /// estimating and caching them on first use
    pub(crate) fn moments(
        &mut self,
        grid_size: usize,
        degree: usize,
        domain: (f64, f64),
    ) -> &(Vec<f64>, Vec<f64>) {
        let key = (grid_size, degree, domain.0.to_bits(), domain.1.to_bits());
        self.moments
            .entry(key)
            .or_insert_with(|| estimate_basis_moments(grid_size, degree, domain))
    }
}

/// estimate `mu0[m] = E[B_m(x)^2]` and `mu1[m] = E[B_m'(x)^2]` over
/// standard-normal inputs clamped into the domain. The basis derivative is
/// estimated by central finite difference, one-sided at the domain edges
fn estimate_basis_moments(
    grid_size: usize,
    degree: usize,
    domain: (f64, f64),
) -> (Vec<f64>, Vec<f64>) {
    let (min, max) = domain;
    let num_control_points = grid_size + 1;
    let knots = clamped_knots(grid_size, degree, min, max);
    let mut mu0 = vec![0.0; num_control_points];
    let mut mu1 = vec![0.0; num_control_points];
    let standard_normal = Normal::new(0.0, 1.0).expect("unable to create normal distribution");
    let mut randomness = thread_rng();
    for _ in 0..MOMENT_SAMPLE_COUNT {
        let x = standard_normal.sample(&mut randomness).clamp(min, max);
        let values = full_basis_values(&knots, degree, num_control_points, x);
        let x_high = (x + MOMENT_FD_STEP).min(max);
        let x_low = (x - MOMENT_FD_STEP).max(min);
        let width = x_high - x_low;
        let values_high = full_basis_values(&knots, degree, num_control_points, x_high);
        let values_low = full_basis_values(&knots, degree, num_control_points, x_low);
        for m in 0..num_control_points {
            mu0[m] += values[m] * values[m];
            if width > 0.0 {
                let derivative = (values_high[m] - values_low[m]) / width;
                mu1[m] += derivative * derivative;
            }
        }
    }
    for m in 0..num_control_points {
        mu0[m] /= MOMENT_SAMPLE_COUNT as f64;
        mu1[m] /= MOMENT_SAMPLE_COUNT as f64;
    }
    debug!(
        "estimated basis moments for grid_size {}, degree {}, domain [{}, {}]",
        grid_size, degree, min, max
    );
    (mu0, mu1)
}
