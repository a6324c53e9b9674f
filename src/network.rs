/// Contains the [`KanEdge`] struct, which carries one learnable function
/// between two nodes.
pub mod edge;
pub mod network_errors;
/// Contains the [`KanNode`] struct, which sums its incoming edges' outputs.
pub mod node;

use edge::KanEdge;
use log::{debug, trace};
use network_errors::{BuildError, ForwardNetworkError};
use node::KanNode;
use rand::thread_rng;
use serde::{Deserialize, Serialize};

use crate::learnable_function::init::{InitScheme, MomentCache};
use crate::learnable_function::{FunctionOptions, LearnableFunction, DEFAULT_DOMAIN};
use crate::ErrorFunction;

/// A layered, fully-connected Kolmogorov-Arnold network.
///
/// Nodes and edges live in flat arena vectors and reference each other by
/// index, so the source/destination back-references never form ownership
/// cycles. Layer 0 is the input layer; the last layer holds the single output
/// node; edges exist only between consecutive layers.
///
/// The network is a single-owner mutable graph: forward, backward, and update
/// are ordinary synchronous calls, and a host that drives training from one
/// place while editing parameters from another must serialize those accesses
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    nodes: Vec<KanNode>,
    edges: Vec<KanEdge>,
    /// node arena indices, grouped by layer in evaluation order
    layers: Vec<Vec<usize>>,
}

/// Hyperparameters for a [`Network`]
///
/// # Examples
/// see [`Network::new`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct NetworkOptions {
    /// nodes per layer, input layer first. The last entry must be 1
    pub shape: Vec<usize>,
    /// identifiers for the input-layer nodes, one per input feature
    pub input_ids: Vec<String>,
    /// every edge's spline has `grid_size + 1` control points
    pub grid_size: usize,
    /// requested spline degree, clamped per-function to `grid_size - 1`
    pub degree: usize,
    pub init_scheme: InitScheme,
}

impl Network {
    /// build a fully-connected layered network from a shape vector.
    ///
    /// Input-layer nodes take the provided string identifiers; hidden and
    /// output nodes are numbered sequentially from 1. One edge is created per
    /// (source, destination) pair of every consecutive layer pair, with
    /// fan-in/fan-out hints taken from the surrounding layer sizes, and is
    /// registered in both endpoints' edge lists.
    ///
    /// # Errors
    /// returns a [`BuildError`] if the shape is empty or has fewer than two
    /// layers, if `shape[0]` disagrees with the number of input ids, or if the
    /// last layer does not hold exactly one node
    ///
    /// # Examples
    /// ```
    /// use kanopy::learnable_function::init::InitScheme;
    /// use kanopy::network::{Network, NetworkOptions};
    ///
    /// let options = NetworkOptions {
    ///     shape: vec![2, 3, 1],
    ///     input_ids: vec!["x".to_string(), "y".to_string()],
    ///     grid_size: 5,
    ///     degree: 3,
    ///     init_scheme: InitScheme::FixedNoise(0.2),
    /// };
    /// let network = Network::new(&options)?;
    /// assert_eq!(network.nodes().len(), 6);
    /// assert_eq!(network.edges().len(), 2 * 3 + 3 * 1);
    /// assert_eq!(network.output_node().id(), "4");
    /// # Ok::<(), kanopy::network::network_errors::BuildError>(())
    /// ```
    pub fn new(options: &NetworkOptions) -> Result<Self, BuildError> {
        if options.shape.is_empty() {
            return Err(BuildError::EmptyShape);
        }
        if options.shape.len() < 2 {
            return Err(BuildError::TooFewLayers {
                actual: options.shape.len(),
            });
        }
        if options.shape[0] != options.input_ids.len() {
            return Err(BuildError::MismatchedInputIds {
                shape_entry: options.shape[0],
                ids_given: options.input_ids.len(),
            });
        }
        let output_size = *options.shape.last().expect("shape is non-empty");
        if output_size != 1 {
            return Err(BuildError::BadOutputLayer {
                actual: output_size,
            });
        }

        let mut nodes = Vec::new();
        let mut layers = Vec::with_capacity(options.shape.len());
        let mut next_node_id = 1; // hidden and output nodes share one numbering
        for (layer_index, &size) in options.shape.iter().enumerate() {
            let mut layer = Vec::with_capacity(size);
            for position in 0..size {
                let id = if layer_index == 0 {
                    options.input_ids[position].clone()
                } else {
                    let id = next_node_id.to_string();
                    next_node_id += 1;
                    id
                };
                layer.push(nodes.len());
                nodes.push(KanNode::new(id));
            }
            layers.push(layer);
        }

        let mut edges: Vec<KanEdge> = Vec::new();
        let mut moment_cache = MomentCache::default();
        let mut randomness = thread_rng();
        for layer_index in 1..layers.len() {
            let fan_in = options.shape[layer_index - 1];
            let fan_out = if layer_index + 1 < options.shape.len() {
                options.shape[layer_index + 1]
            } else {
                1
            };
            let function_options = FunctionOptions {
                grid_size: options.grid_size,
                degree: options.degree,
                domain: DEFAULT_DOMAIN,
                init_scheme: options.init_scheme,
                fan_in,
                fan_out,
            };
            for dest_position in 0..layers[layer_index].len() {
                let dest = layers[layer_index][dest_position];
                for source_position in 0..layers[layer_index - 1].len() {
                    let source = layers[layer_index - 1][source_position];
                    let id = format!("{}-{}", nodes[source].id(), nodes[dest].id());
                    let function = LearnableFunction::new(
                        id.clone(),
                        &function_options,
                        &mut moment_cache,
                        &mut randomness,
                    );
                    let edge_index = edges.len();
                    edges.push(KanEdge::new(id, source, dest, function));
                    nodes[source].register_output_edge(edge_index);
                    nodes[dest].register_input_edge(edge_index);
                }
            }
        }
        debug!(
            "built network with {} nodes and {} edges across {} layers",
            nodes.len(),
            edges.len(),
            layers.len()
        );
        Ok(Network {
            nodes,
            edges,
            layers,
        })
    }

    /// run one forward pass and return the output node's value.
    ///
    /// Inputs are written straight into the input-layer nodes - the input
    /// layer has no incoming edges - then each subsequent layer is evaluated
    /// in order, so every node's sources are already up to date when it runs.
    /// When `record_histograms` is set, every active edge records its input
    /// and output activations.
    ///
    /// # Errors
    /// returns a [`ForwardNetworkError`] if `inputs` is not exactly as long as
    /// the input layer
    pub fn forward(
        &mut self,
        inputs: &[f64],
        record_histograms: bool,
    ) -> Result<f64, ForwardNetworkError> {
        if inputs.len() != self.layers[0].len() {
            return Err(ForwardNetworkError::MissizedInputs {
                actual: inputs.len(),
                expected: self.layers[0].len(),
            });
        }
        for (value, &node_index) in inputs.iter().zip(self.layers[0].iter()) {
            self.nodes[node_index].output = if self.nodes[node_index].is_active() {
                *value
            } else {
                0.0
            };
        }
        for layer_index in 1..self.layers.len() {
            for position in 0..self.layers[layer_index].len() {
                let node_index = self.layers[layer_index][position];
                self.forward_node(node_index, record_histograms);
            }
        }
        let output = self.output_node().output;
        trace!("forward pass produced {}", output);
        Ok(output)
    }

    fn forward_node(&mut self, node_index: usize, record_histograms: bool) {
        if !self.nodes[node_index].is_active() {
            self.nodes[node_index].output = 0.0;
            return;
        }
        let mut sum = 0.0;
        for position in 0..self.nodes[node_index].input_edges().len() {
            let edge_index = self.nodes[node_index].input_edges()[position];
            let source_output = self.nodes[self.edges[edge_index].source()].output;
            sum += self.edges[edge_index].forward(source_output, record_histograms);
        }
        self.nodes[node_index].output = sum;
    }

    /// backpropagate the error for the most recent forward pass.
    ///
    /// Seeds the output node's derivative with `error_function.der(output,
    /// target)`, then walks the layers right to left. Each layer's backward
    /// step writes into the previous layer's nodes, so those derivatives are
    /// zeroed immediately beforehand - every node's derivative accumulates
    /// fresh within one backward pass and never leaks across training steps.
    /// Gradients land in each edge's accumulator; parameters only change in
    /// [`Network::update`]
    pub fn backward(&mut self, target: f64, error_function: &impl ErrorFunction) {
        let output_index = self.output_node_index();
        let output = self.nodes[output_index].output;
        self.nodes[output_index].output_der = error_function.der(output, target);
        for layer_index in (1..self.layers.len()).rev() {
            for position in 0..self.layers[layer_index - 1].len() {
                let node_index = self.layers[layer_index - 1][position];
                self.nodes[node_index].output_der = 0.0;
            }
            for position in 0..self.layers[layer_index].len() {
                let node_index = self.layers[layer_index][position];
                self.backward_node(node_index);
            }
        }
    }

    fn backward_node(&mut self, node_index: usize) {
        if !self.nodes[node_index].is_active() {
            return;
        }
        let node_derivative = self.nodes[node_index].output_der;
        for position in 0..self.nodes[node_index].input_edges().len() {
            let edge_index = self.nodes[node_index].input_edges()[position];
            if !self.edges[edge_index].is_active() {
                continue;
            }
            // the spline output is linear in its control points, so the edge's
            // parameter gradient uses the upstream derivative directly; the
            // input-side chain rule goes through the spline derivative
            let input_gradient = node_derivative
                * self.edges[edge_index]
                    .function()
                    .derivative(self.edges[edge_index].last_input());
            self.edges[edge_index].accumulate_gradients(node_derivative);
            let source = self.edges[edge_index].source();
            self.nodes[source].output_der += input_gradient;
        }
    }

    /// apply every edge's averaged accumulated gradients and clear the
    /// accumulators. Edges with no accumulated examples are untouched
    pub fn update(&mut self, learning_rate: f64) {
        trace!("updating {} edges", self.edges.len());
        for edge in self.edges.iter_mut() {
            edge.update_parameters(learning_rate);
        }
    }

    /// discard all accumulated gradients without applying them
    pub fn zero_gradients(&mut self) {
        for edge in self.edges.iter_mut() {
            edge.zero_gradients();
        }
    }

    /// clear every edge's activation histograms. Gradient accumulators and
    /// parameters are untouched
    pub fn reset_histograms(&mut self) {
        for edge in self.edges.iter_mut() {
            edge.reset_histograms();
        }
    }

    /// widen every edge's histogram display ranges to the observed ranges.
    /// Opt-in adaptive behavior; see [`KanEdge::recalibrate_histograms`]
    pub fn recalibrate_histograms(&mut self) {
        for edge in self.edges.iter_mut() {
            edge.recalibrate_histograms();
        }
    }

    fn output_node_index(&self) -> usize {
        let output_layer = self.layers.last().expect("network always has layers");
        output_layer[0]
    }

    /// the last layer's sole node
    pub fn output_node(&self) -> &KanNode {
        &self.nodes[self.output_node_index()]
    }

    /// visit every node in layer order, optionally skipping the input layer
    pub fn for_each_node(&self, skip_input_layer: bool, mut visitor: impl FnMut(&KanNode)) {
        let first_layer = if skip_input_layer { 1 } else { 0 };
        for layer in self.layers[first_layer..].iter() {
            for &node_index in layer.iter() {
                visitor(&self.nodes[node_index]);
            }
        }
    }

    /// all nodes in arena order (layer by layer)
    pub fn nodes(&self) -> &[KanNode] {
        &self.nodes
    }

    /// all edges in arena order
    pub fn edges(&self) -> &[KanEdge] {
        &self.edges
    }

    /// node arena indices grouped by layer, input layer first
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// the node at the given arena index
    pub fn node(&self, index: usize) -> &KanNode {
        &self.nodes[index]
    }

    /// mutable access to a node, for interactive enable/disable
    pub fn node_mut(&mut self, index: usize) -> &mut KanNode {
        &mut self.nodes[index]
    }

    /// the edge at the given arena index
    pub fn edge(&self, index: usize) -> &KanEdge {
        &self.edges[index]
    }

    /// mutable access to an edge, for interactive enable/disable and direct
    /// control-point edits
    pub fn edge_mut(&mut self, index: usize) -> &mut KanEdge {
        &mut self.edges[index]
    }

    /// total number of parameters across all edges, trained and untrained
    pub fn parameter_count(&self) -> usize {
        self.edges
            .iter()
            .map(|edge| edge.function().control_points().len() + edge.function().knots().len())
            .sum()
    }

    /// total number of trainable parameters (control points) across all edges
    pub fn trainable_parameter_count(&self) -> usize {
        self.edges
            .iter()
            .map(|edge| edge.function().control_points().len())
            .sum()
    }
}
