use serde::{Deserialize, Serialize};

/// A node in a KAN: the sum of its incoming edges' outputs.
///
/// Unlike a traditional neural network node there is no activation function
/// here - the nonlinearity lives on the edges. The node caches its output from
/// the most recent forward pass and the error derivative with respect to that
/// output from the most recent backward pass, both of which the host reads for
/// visualization.
///
/// Edge lists hold arena indices into the owning
/// [`Network`](crate::network::Network)'s edge vector and are fixed after
/// assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanNode {
    id: String,
    input_edges: Vec<usize>,
    output_edges: Vec<usize>,
    active: bool,
    #[serde(skip)]
    pub(crate) output: f64,
    #[serde(skip)]
    pub(crate) output_der: f64,
}

impl KanNode {
    pub(crate) fn new(id: String) -> Self {
        KanNode {
            id,
            input_edges: Vec::new(),
            output_edges: Vec::new(),
            active: true,
            output: 0.0,
            output_der: 0.0,
        }
    }

    pub(crate) fn register_input_edge(&mut self, edge_index: usize) {
        self.input_edges.push(edge_index);
    }

    pub(crate) fn register_output_edge(&mut self, edge_index: usize) {
        self.output_edges.push(edge_index);
    }

    /// the node identifier: the host-provided feature id for input-layer
    /// nodes, a sequential number for hidden and output nodes
    pub fn id(&self) -> &str {
        &self.id
    }

    /// the cached output of the most recent forward pass
    pub fn output(&self) -> f64 {
        self.output
    }

    /// the cached error derivative with respect to this node's output, from
    /// the most recent backward pass
    pub fn output_derivative(&self) -> f64 {
        self.output_der
    }

    /// whether this node currently participates in forward and backward passes
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// enable or disable this node. An inactive node always outputs zero and
    /// never backpropagates
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// arena indices of the edges feeding this node
    pub fn input_edges(&self) -> &[usize] {
        &self.input_edges
    }

    /// arena indices of the edges this node feeds
    pub fn output_edges(&self) -> &[usize] {
        &self.output_edges
    }
}

impl PartialEq for KanNode {
    // identity only: cached outputs and derivatives are operating state
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.input_edges == other.input_edges
            && self.output_edges == other.output_edges
            && self.active == other.active
    }
}
