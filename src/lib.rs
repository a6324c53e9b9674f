#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library to build and train small Kolmogorov-Arnold networks for interactive hosts.
//!
//! The `kanopy` crate contains the numerical core of an interactive KAN
//! playground: a layered graph of nodes whose edges each carry a *learnable
//! univariate function* - a clamped B-spline - trained by backpropagation.
//! Rather than perform a weighted sum of the previous layer's activations and
//! pass it through a fixed non-linear function, each node passes each incoming
//! activation through a different, trainable spline, then sums the results.
//! The control points of those splines are the model's parameters.
//!
//! The crate deliberately stops at the math. Rendering nodes and edges,
//! chart drawing, slider wiring, dataset thumbnails, and URL state all belong
//! to the host, which consumes the core through a small surface: build a
//! [`Network`](network::Network) from a shape, run forward/backward passes,
//! read node and edge state, and apply parameter updates. Networks here are
//! tens of nodes, sized for real-time training in a UI, not for batch jobs -
//! there is no tensor batching and no GPU path.
//!
//! The [`learnable_function`] module contains the spline machinery:
//! knot-vector construction, de Boor evaluation, analytic basis gradients, and
//! the [initialization schemes](learnable_function::init::InitScheme),
//! including a variance-preserving scheme that adapts Glorot-style scaling to
//! the localized support of spline bases.
//!
//! # Examples
//! Build a network with 2 input features, one hidden layer of 3 nodes, and
//! degree-3 splines with 6 control points on every edge, then train it on a
//! small batch:
//! ```
//! use kanopy::learnable_function::init::InitScheme;
//! use kanopy::network::{Network, NetworkOptions};
//! use kanopy::{train_batch, Sample, SquaredError};
//!
//! let options = NetworkOptions {
//!     shape: vec![2, 3, 1],
//!     input_ids: vec!["x".to_string(), "y".to_string()],
//!     grid_size: 5,
//!     degree: 3,
//!     init_scheme: InitScheme::FixedNoise(0.2),
//! };
//! let mut network = Network::new(&options)?;
//!
//! let batch = vec![
//!     Sample::new(vec![0.1, -0.4], 0.5),
//!     Sample::new(vec![-0.3, 0.8], -0.2),
//! ];
//! let batch_loss = train_batch(&mut network, &batch, 0.01, &SquaredError)?;
//! assert!(batch_loss.is_finite());
//!
//! // the host drives the stepping loop; one call per animation frame is typical
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Contains the spline representation of a learnable univariate function and
/// its initialization schemes.
pub mod learnable_function;
/// Contains the [`Network`](network::Network) struct - the layered node/edge
/// graph - and its forward/backward/update operations.
pub mod network;

use network::network_errors::ForwardNetworkError;
use network::Network;
use serde::{Deserialize, Serialize};

/// A sample of data to be used in training a network.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// The input data for the network, one value per input feature
    features: Vec<f64>,
    /// The expected output of the network
    label: f64,
}

impl Sample {
    /// Create a new Sample
    pub fn new(features: Vec<f64>, label: f64) -> Self {
        Sample { features, label }
    }

    /// Get the features of the sample
    pub fn features(&self) -> &Vec<f64> {
        &self.features
    }
    /// Get the label of the sample
    pub fn label(&self) -> f64 {
        self.label
    }
}

/// The error function driving backpropagation.
///
/// `der` is the derivative of `error` with respect to `output`; the backward
/// pass seeds the output node's derivative with it. The canonical
/// implementation is [`SquaredError`]
pub trait ErrorFunction {
    /// the loss for a single example
    fn error(&self, output: f64, target: f64) -> f64;
    /// the derivative of the loss with respect to `output`
    fn der(&self, output: f64, target: f64) -> f64;
}

/// Squared error, `0.5 * (output - target)^2`, with derivative `output - target`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SquaredError;

impl ErrorFunction for SquaredError {
    fn error(&self, output: f64, target: f64) -> f64 {
        0.5 * (output - target).powi(2)
    }

    fn der(&self, output: f64, target: f64) -> f64 {
        output - target
    }
}

/// Run one mini-batch training step: a forward and backward pass per sample,
/// then a single parameter update with the averaged gradients.
///
/// Gradient accumulation and parameter application are decoupled inside the
/// edges, so the batch can be any size; an empty batch is a no-op. Returns the
/// mean loss over the batch, measured before the update.
///
/// # Errors
/// returns a [`ForwardNetworkError`] if any sample's feature vector does not
/// match the network's input layer
///
/// # Examples
/// see the [crate-level documentation](crate)
pub fn train_batch<E: ErrorFunction>(
    network: &mut Network,
    batch: &[Sample],
    learning_rate: f64,
    error_function: &E,
) -> Result<f64, ForwardNetworkError> {
    if batch.is_empty() {
        return Ok(0.0);
    }
    let mut batch_loss = 0.0;
    for sample in batch {
        let output = network.forward(sample.features(), false)?;
        batch_loss += error_function.error(output, sample.label());
        network.backward(sample.label(), error_function);
    }
    network.update(learning_rate);
    Ok(batch_loss / batch.len() as f64)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::learnable_function::init::InitScheme;
    use crate::network::NetworkOptions;

    fn build_test_network(noise: f64) -> Network {
        Network::new(&NetworkOptions {
            shape: vec![1, 2, 1],
            input_ids: vec!["x".to_string()],
            grid_size: 5,
            degree: 3,
            init_scheme: InitScheme::FixedNoise(noise),
        })
        .unwrap()
    }

    #[test]
    fn test_squared_error() {
        let error_function = SquaredError;
        assert_eq!(error_function.error(3.0, 1.0), 2.0);
        assert_eq!(error_function.der(3.0, 1.0), 2.0);
        assert_eq!(error_function.error(1.0, 1.0), 0.0);
        assert_eq!(error_function.der(0.0, 1.0), -1.0);
    }

    #[test]
    fn test_train_batch_reports_mean_loss() {
        let mut network = build_test_network(0.0);
        // a zero-initialized network outputs 0 for every input
        let batch = vec![Sample::new(vec![0.2], 1.0), Sample::new(vec![-0.4], -1.0)];
        let batch_loss = train_batch(&mut network, &batch, 0.0, &SquaredError).unwrap();
        assert_eq!(batch_loss, 0.5); // (0.5 * 1 + 0.5 * 1) / 2
    }

    #[test]
    fn test_train_batch_empty_batch_is_a_no_op() {
        let mut network = build_test_network(0.3);
        let control_points_before: Vec<Vec<f64>> = network
            .edges()
            .iter()
            .map(|edge| edge.function().control_points().to_vec())
            .collect();
        let batch_loss = train_batch(&mut network, &[], 0.1, &SquaredError).unwrap();
        assert_eq!(batch_loss, 0.0);
        let control_points_after: Vec<Vec<f64>> = network
            .edges()
            .iter()
            .map(|edge| edge.function().control_points().to_vec())
            .collect();
        assert_eq!(control_points_before, control_points_after);
    }

    #[test]
    fn test_train_batch_propagates_shape_mismatch() {
        let mut network = build_test_network(0.3);
        let batch = vec![Sample::new(vec![0.2, 0.4], 1.0)];
        assert!(train_batch(&mut network, &batch, 0.1, &SquaredError).is_err());
    }

    #[test]
    fn test_repeated_batches_reduce_loss_on_a_fixed_target() {
        let mut network = build_test_network(0.3);
        let batch = vec![
            Sample::new(vec![-0.5], 0.25),
            Sample::new(vec![0.0], 0.0),
            Sample::new(vec![0.5], 0.25),
        ];
        let initial_loss = train_batch(&mut network, &batch, 0.05, &SquaredError).unwrap();
        let mut final_loss = initial_loss;
        for _ in 0..200 {
            final_loss = train_batch(&mut network, &batch, 0.05, &SquaredError).unwrap();
        }
        assert!(
            final_loss < initial_loss,
            "loss did not decrease over training. initial: {}, final: {}",
            initial_loss,
            final_loss
        );
    }
}
