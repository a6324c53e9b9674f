pub mod init;

use init::{InitScheme, MomentCache};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The canonical evaluation domain for learnable functions, used by
/// [`Network::new`](crate::network::Network::new) when building edges.
pub const DEFAULT_DOMAIN: (f64, f64) = (-1.0, 1.0);

/// A learnable scalar function represented as a clamped B-spline.
///
/// Rather than a scalar weight, each edge in a KAN carries one of these: a
/// spline whose control points are the trainable parameters. The knot vector
/// is clamped - the first and last `degree + 1` knots sit on the domain
/// bounds - so the curve interpolates its endpoint control points, and the
/// interior knots are uniformly spaced. Grid size and degree are fixed for
/// the life of the function; only the control points move during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnableFunction {
    id: String,
    degree: usize,
    control_points: Vec<f64>,
    knots: Vec<f64>,
    domain_min: f64,
    domain_max: f64,
}

/// Hyperparameters for a [`LearnableFunction`]
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct FunctionOptions {
    /// the spline has `grid_size + 1` control points
    pub grid_size: usize,
    /// requested spline degree. Clamped to `grid_size - 1` at construction so the host can sweep degree and grid size independently without errors
    pub degree: usize,
    /// the input domain `(min, max)`. Inputs outside the domain are clamped before evaluation
    pub domain: (f64, f64),
    pub init_scheme: InitScheme,
    /// number of edges into the destination node, used only at initialization
    pub fan_in: usize,
    /// number of edges out of the destination node, used only at initialization
    pub fan_out: usize,
}

impl LearnableFunction {
    /// create a new function with a clamped, uniformly spaced knot vector and
    /// control points drawn per `options.init_scheme`.
    ///
    /// The moment cache memoizes the Monte-Carlo basis moments used by
    /// [`InitScheme::BasisAware`], which are shared by every function with the
    /// same `(grid_size, degree, domain)`. Pass the same cache to every
    /// function built for one network.
    ///
    /// # Examples
    /// ```
    /// use kanopy::learnable_function::init::{InitScheme, MomentCache};
    /// use kanopy::learnable_function::{FunctionOptions, LearnableFunction};
    /// use rand::thread_rng;
    ///
    /// let options = FunctionOptions {
    ///     grid_size: 5,
    ///     degree: 3,
    ///     domain: (-1.0, 1.0),
    ///     init_scheme: InitScheme::FixedNoise(0.5),
    ///     fan_in: 1,
    ///     fan_out: 1,
    /// };
    /// let function = LearnableFunction::new(
    ///     "x-1".to_string(),
    ///     &options,
    ///     &mut MomentCache::default(),
    ///     &mut thread_rng(),
    /// );
    /// assert_eq!(function.control_points().len(), options.grid_size + 1);
    /// assert_eq!(function.knots().len(), options.grid_size + options.degree + 2);
    /// ```
    pub fn new(
        id: String,
        options: &FunctionOptions,
        moment_cache: &mut MomentCache,
        rng: &mut impl Rng,
    ) -> Self {
        let (domain_min, domain_max) = options.domain;
        let degree = options.degree.min(options.grid_size.saturating_sub(1));
        let knots = clamped_knots(options.grid_size, degree, domain_min, domain_max);
        let control_points = options.init_scheme.sample_control_points(
            options.grid_size,
            degree,
            options.domain,
            options.fan_in,
            options.fan_out,
            moment_cache,
            rng,
        );
        LearnableFunction {
            id,
            degree,
            control_points,
            knots,
            domain_min,
            domain_max,
        }
    }

    /// compute the value of the spline at `x`, clamping `x` into the domain first.
    ///
    /// Uses de Boor's recursion over the knot span containing `x`, which is
    /// numerically stable for the clamped knot vectors built here: every
    /// blending denominator covers at least one non-degenerate breakpoint
    /// interval
    pub fn evaluate(&self, x: f64) -> f64 {
        let x = x.clamp(self.domain_min, self.domain_max);
        let p = self.degree;
        let span = knot_span(&self.knots, p, self.control_points.len(), x);
        let mut d: Vec<f64> = (0..=p).map(|j| self.control_points[span - p + j]).collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let denominator = self.knots[span + j - r + 1] - self.knots[span - p + j];
                let alpha = if denominator > 0.0 {
                    (x - self.knots[span - p + j]) / denominator
                } else {
                    0.0
                };
                d[j] = (1.0 - alpha) * d[j - 1] + alpha * d[j];
            }
        }
        d[p]
    }

    /// compute `d/dx` of the spline at `x`, clamping `x` into the domain first.
    ///
    /// Uses the analytic B-spline derivative - a degree `p` spline's derivative
    /// is a degree `p - 1` spline over the control-point differences - rather
    /// than a finite-difference approximation, so the input-side chain-rule
    /// term in backpropagation is exact. Degenerate knot spans contribute zero.
    /// A degree-0 function is piecewise constant and has derivative 0 everywhere
    pub fn derivative(&self, x: f64) -> f64 {
        let p = self.degree;
        if p == 0 {
            return 0.0;
        }
        let x = x.clamp(self.domain_min, self.domain_max);
        let span = knot_span(&self.knots, p, self.control_points.len(), x);
        let lower_basis = basis_values(&self.knots, p - 1, span, x);
        let mut result = 0.0;
        for (offset, basis) in lower_basis.iter().enumerate() {
            let j = span - p + 1 + offset;
            let width = self.knots[j + p] - self.knots[j];
            if width > 0.0 {
                result +=
                    p as f64 * (self.control_points[j] - self.control_points[j - 1]) / width * basis;
            }
        }
        result
    }

    /// compute the gradient of [`evaluate(x)`](LearnableFunction::evaluate) with
    /// respect to each control point, as a vector the same length as the
    /// control-point vector.
    ///
    /// Because the spline is linear in its control points, the gradient with
    /// respect to control point `m` is exactly the `m`-th basis function value
    /// at `x`; only the `degree + 1` basis functions whose support contains `x`
    /// are non-zero. The active values are computed with the Cox-de Boor
    /// triangular recurrence and scattered into a zero vector
    pub fn control_point_gradients(&self, x: f64) -> Vec<f64> {
        let x = x.clamp(self.domain_min, self.domain_max);
        full_basis_values(&self.knots, self.degree, self.control_points.len(), x)
    }

    /// apply one gradient-descent step in place: `control_points[i] -= learning_rate * gradients[i]`.
    ///
    /// Only the overlapping length of the two vectors is touched; by
    /// construction the caller's gradient vector always matches the
    /// control-point count
    pub fn update_parameters(&mut self, gradients: &[f64], learning_rate: f64) {
        for (control_point, gradient) in self.control_points.iter_mut().zip(gradients.iter()) {
            *control_point -= learning_rate * gradient;
        }
    }

    /// the identifier this function was created with
    pub fn id(&self) -> &str {
        &self.id
    }

    /// the spline degree actually in use, after clamping to `grid_size - 1`
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// the trainable parameters of this function
    pub fn control_points(&self) -> &[f64] {
        &self.control_points
    }

    /// the clamped knot vector, of length `|control points| + degree + 1`
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// the input domain `(min, max)`
    pub fn domain(&self) -> (f64, f64) {
        (self.domain_min, self.domain_max)
    }

    /// overwrite a single control point. Used by interactive hosts that let
    /// the user drag control points directly
    pub fn set_control_point(&mut self, index: usize, value: f64) {
        self.control_points[index] = value;
    }
}

/// build the clamped knot vector for a spline with `grid_size + 1` control
/// points: `degree + 1` copies of `min`, then `grid_size - degree` uniformly
/// spaced interior knots strictly between the bounds, then `degree + 1` copies
/// of `max`
pub(crate) fn clamped_knots(grid_size: usize, degree: usize, min: f64, max: f64) -> Vec<f64> {
    let num_knots = grid_size + degree + 2; // |control points| + degree + 1
    let num_interior = num_knots - 2 * (degree + 1);
    let mut knots = Vec::with_capacity(num_knots);
    for _ in 0..=degree {
        knots.push(min);
    }
    let step_size = (max - min) / (num_interior + 1) as f64;
    for i in 1..=num_interior {
        knots.push(min + i as f64 * step_size);
    }
    for _ in 0..=degree {
        knots.push(max);
    }
    knots
}

/// locate the knot span index `s` such that `knots[s] <= x < knots[s + 1]`,
/// using binary search for interior values. `x` at or beyond the last
/// breakpoint maps to span `n = |control points| - 1`; `x` at or before the
/// first non-trivial knot maps to span `degree`
pub(crate) fn knot_span(knots: &[f64], degree: usize, num_control_points: usize, x: f64) -> usize {
    let n = num_control_points - 1;
    if x >= knots[n + 1] {
        return n;
    }
    if x <= knots[degree] {
        return degree;
    }
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while x < knots[mid] || x >= knots[mid + 1] {
        if x < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// compute the `degree + 1` basis function values active on the given knot
/// span via the Cox-de Boor triangular recurrence. Index `r` of the result is
/// the value of basis function `span - degree + r` at `x`. A zero blending
/// denominator (repeated knots) contributes zero rather than NaN
pub(crate) fn basis_values(knots: &[f64], degree: usize, span: usize, x: f64) -> Vec<f64> {
    let mut values = vec![0.0; degree + 1];
    values[0] = 1.0;
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    for j in 1..=degree {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denominator = right[r + 1] + left[j - r];
            let term = if denominator > 0.0 {
                values[r] / denominator
            } else {
                0.0
            };
            values[r] = saved + right[r + 1] * term;
            saved = left[j - r] * term;
        }
        values[j] = saved;
    }
    values
}

/// as [`basis_values`], but scattered into a zero vector of length
/// `num_control_points`, so index `m` is the value of basis function `m` at `x`
pub(crate) fn full_basis_values(
    knots: &[f64],
    degree: usize,
    num_control_points: usize,
    x: f64,
) -> Vec<f64> {
    let span = knot_span(knots, degree, num_control_points, x);
    let active = basis_values(knots, degree, span, x);
    let mut values = vec![0.0; num_control_points];
    for (offset, value) in active.iter().enumerate() {
        values[span - degree + offset] = *value;
    }
    values
}

/// generate `num` values evenly spaced between `min` and `max` inclusive
pub(crate) fn linspace(min: f64, max: f64, num: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(num);
    let num_intervals = num - 1;
    let step_size = (max - min) / num_intervals as f64;
    for i in 0..num_intervals {
        values.push(min + i as f64 * step_size);
    }
    values.push(max);
    values
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;
    use statrs::assert_almost_eq;

    use super::*;

    fn build_test_function(grid_size: usize, degree: usize, noise: f64) -> LearnableFunction {
        let options = FunctionOptions {
            grid_size,
            degree,
            domain: (-1.0, 1.0),
            init_scheme: InitScheme::FixedNoise(noise),
            fan_in: 1,
            fan_out: 1,
        };
        LearnableFunction::new(
            "test".to_string(),
            &options,
            &mut MomentCache::default(),
            &mut thread_rng(),
        )
    }

    fn function_with_control_points(
        grid_size: usize,
        degree: usize,
        control_points: Vec<f64>,
    ) -> LearnableFunction {
        let mut function = build_test_function(grid_size, degree, 0.0);
        assert_eq!(function.control_points().len(), control_points.len());
        for (i, value) in control_points.iter().enumerate() {
            function.set_control_point(i, *value);
        }
        function
    }

    #[test]
    fn test_clamped_knot_construction() {
        let function = build_test_function(4, 3, 0.0);
        let expected_knots = vec![-1.0, -1.0, -1.0, -1.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(function.knots(), expected_knots.as_slice());
        assert_eq!(function.control_points().len(), 5);
    }

    #[test]
    fn test_clamped_knot_construction_multiple_interior() {
        let function = build_test_function(6, 2, 0.0);
        // 7 control points, degree 2 -> 10 knots, 4 interior
        let expected_knots = vec![-1.0, -1.0, -1.0, -0.6, -0.2, 0.2, 0.6, 1.0, 1.0, 1.0];
        let rounded_knots: Vec<f64> = function
            .knots()
            .iter()
            .map(|k| (k * 10000.0).round() / 10000.0)
            .collect();
        assert_eq!(rounded_knots, expected_knots);
    }

    #[test]
    fn test_degree_clamped_to_grid_size() {
        let function = build_test_function(2, 5, 0.0);
        assert_eq!(function.degree(), 1);
        assert_eq!(function.knots().len(), 3 + 1 + 1);
    }

    #[test]
    fn test_zero_control_points_evaluate_to_zero() {
        let function = build_test_function(4, 3, 0.0);
        for x in [-1.0, -0.5, 0.0, 0.3, 0.99, 1.0] {
            assert_eq!(function.evaluate(x), 0.0, "x = {}", x);
        }
    }

    #[test]
    fn test_constant_control_points_evaluate_to_constant() {
        // by partition of unity, a constant control-point vector is the constant function
        let v = 0.7;
        let function = function_with_control_points(4, 3, vec![v; 5]);
        for x in [-1.0, -0.3, 0.0, 0.3, 1.0] {
            assert_almost_eq!(function.evaluate(x), v, 1e-12);
        }
    }

    #[test]
    fn test_endpoint_interpolation() {
        for (grid_size, degree) in [(4, 1), (4, 2), (4, 3), (7, 5)] {
            let control_points: Vec<f64> =
                (0..=grid_size).map(|i| (i as f64) * 0.3 - 0.8).collect();
            let function = function_with_control_points(grid_size, degree, control_points.clone());
            assert_almost_eq!(
                function.evaluate(-1.0),
                control_points[0],
                1e-12
            );
            assert_almost_eq!(
                function.evaluate(1.0),
                control_points[control_points.len() - 1],
                1e-12
            );
        }
    }

    #[test]
    fn test_evaluate_clamps_out_of_domain_inputs() {
        let control_points = vec![0.4, -0.2, 0.9, 0.1, -0.6];
        let function = function_with_control_points(4, 3, control_points.clone());
        assert_eq!(function.evaluate(-100.0), function.evaluate(-1.0));
        assert_eq!(function.evaluate(100.0), function.evaluate(1.0));
    }

    #[test]
    fn test_partition_of_unity() {
        for (grid_size, degree) in [(4, 3), (5, 2), (7, 1), (3, 3), (10, 5), (1, 0)] {
            let function = build_test_function(grid_size, degree, 0.0);
            for x in [-1.0, -0.77, -0.5, -0.1, 0.0, 0.33, 0.5, 0.89, 1.0] {
                let basis_sum: f64 = function.control_point_gradients(x).iter().sum();
                assert_almost_eq!(basis_sum, 1.0, 1e-9);
            }
        }
    }

    #[test]
    fn test_linearity_in_parameters() {
        let c1 = vec![0.5, -0.3, 0.8, 0.2, -0.9, 0.1];
        let c2 = vec![-0.2, 0.7, -0.5, 0.4, 0.6, -0.3];
        let alpha = 0.37;
        let blended: Vec<f64> = c1
            .iter()
            .zip(c2.iter())
            .map(|(a, b)| alpha * a + (1.0 - alpha) * b)
            .collect();
        let f1 = function_with_control_points(5, 3, c1);
        let f2 = function_with_control_points(5, 3, c2);
        let f_blended = function_with_control_points(5, 3, blended);
        for x in [-0.9, -0.25, 0.0, 0.42, 0.9] {
            assert_almost_eq!(
                f_blended.evaluate(x),
                alpha * f1.evaluate(x) + (1.0 - alpha) * f2.evaluate(x),
                1e-12
            );
        }
    }

    #[test]
    fn test_control_point_gradients_match_finite_difference() {
        let control_points = vec![0.3, -0.6, 0.1, 0.8, -0.2, 0.5];
        let function = function_with_control_points(5, 3, control_points.clone());
        let epsilon = 1e-6;
        for x in [-0.8, -0.33, 0.0, 0.51, 0.97] {
            let gradients = function.control_point_gradients(x);
            assert_eq!(gradients.len(), control_points.len());
            for m in 0..control_points.len() {
                let mut perturbed_up = function.clone();
                perturbed_up.set_control_point(m, control_points[m] + epsilon);
                let mut perturbed_down = function.clone();
                perturbed_down.set_control_point(m, control_points[m] - epsilon);
                let measured =
                    (perturbed_up.evaluate(x) - perturbed_down.evaluate(x)) / (2.0 * epsilon);
                assert_almost_eq!(gradients[m], measured, 1e-7);
            }
        }
    }

    #[test]
    fn test_derivative_matches_finite_difference_of_evaluate() {
        let control_points = vec![0.3, -0.6, 0.1, 0.8, -0.2, 0.5];
        let function = function_with_control_points(5, 3, control_points);
        let h = 1e-6;
        for x in [-0.73, -0.21, 0.08, 0.37, 0.81] {
            let measured = (function.evaluate(x + h) - function.evaluate(x - h)) / (2.0 * h);
            assert_almost_eq!(function.derivative(x), measured, 1e-5);
        }
    }

    #[test]
    fn test_derivative_of_degree_zero_is_zero() {
        let function = function_with_control_points(4, 0, vec![0.1, 0.4, -0.3, 0.9, 0.0]);
        assert_eq!(function.derivative(0.3), 0.0);
    }

    #[test]
    fn test_update_parameters() {
        let mut function = function_with_control_points(4, 3, vec![1.0; 5]);
        let gradients = vec![0.5, -0.5, 0.0, 1.0, 2.0];
        function.update_parameters(&gradients, 0.1);
        let expected = vec![0.95, 1.05, 1.0, 0.9, 0.8];
        let rounded: Vec<f64> = function
            .control_points()
            .iter()
            .map(|c| (c * 10000.0).round() / 10000.0)
            .collect();
        assert_eq!(rounded, expected);
    }

    #[test]
    fn test_update_parameters_tolerates_short_gradient_vector() {
        let mut function = function_with_control_points(4, 3, vec![1.0; 5]);
        function.update_parameters(&[1.0, 1.0], 0.1);
        assert_eq!(function.control_points(), &[0.9, 0.9, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_knot_span_boundaries() {
        let knots = clamped_knots(4, 3, -1.0, 1.0);
        // 5 control points -> n = 4; spans clamp to [degree, n]
        assert_eq!(knot_span(&knots, 3, 5, -1.0), 3);
        assert_eq!(knot_span(&knots, 3, 5, -2.0), 3);
        assert_eq!(knot_span(&knots, 3, 5, 1.0), 4);
        assert_eq!(knot_span(&knots, 3, 5, 2.0), 4);
        assert_eq!(knot_span(&knots, 3, 5, -0.5), 3);
        assert_eq!(knot_span(&knots, 3, 5, 0.5), 4);
    }
}
