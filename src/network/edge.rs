/// Contains the decaying activation histograms edges record for visualization.
pub mod histogram;

use histogram::{
    ActivationHistogram, HISTOGRAM_BIN_COUNT, INPUT_HISTOGRAM_DECAY, OUTPUT_HISTOGRAM_DECAY,
};
use serde::{Deserialize, Serialize};

use crate::learnable_function::LearnableFunction;

/// An edge between two nodes in consecutive layers, carrying one [`LearnableFunction`].
///
/// The edge latches its most recent input during the forward pass, accumulates
/// per-control-point gradients during backward passes, and applies the
/// averaged gradient on update - the classic sum-then-average mini-batch
/// contract, with the accumulate and apply steps deliberately decoupled so the
/// caller picks the batch size. It also records input- and output-activation
/// histograms for the host to draw.
///
/// Source and destination are arena indices into the owning
/// [`Network`](crate::network::Network)'s node vector; connectivity is owned by
/// the node edge-lists, not by the edge itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanEdge {
    id: String,
    source: usize,
    dest: usize,
    function: LearnableFunction,
    active: bool,
    // the remaining fields are operating state, not identity. last_input is
    // re-latched on the first forward pass after deserialization; the gradient
    // buffer stays serialized so it deserializes at the right length
    #[serde(skip)]
    last_input: f64,
    accumulated_gradients: Vec<f64>,
    num_accumulated: usize,
    input_histogram: ActivationHistogram,
    output_histogram: ActivationHistogram,
}

impl KanEdge {
    pub(crate) fn new(id: String, source: usize, dest: usize, function: LearnableFunction) -> Self {
        let (domain_min, domain_max) = function.domain();
        let num_control_points = function.control_points().len();
        KanEdge {
            id,
            source,
            dest,
            active: true,
            last_input: 0.0,
            accumulated_gradients: vec![0.0; num_control_points],
            num_accumulated: 0,
            input_histogram: ActivationHistogram::new(
                HISTOGRAM_BIN_COUNT,
                domain_min,
                domain_max,
                INPUT_HISTOGRAM_DECAY,
            ),
            output_histogram: ActivationHistogram::new(
                HISTOGRAM_BIN_COUNT,
                domain_min,
                domain_max,
                OUTPUT_HISTOGRAM_DECAY,
            ),
            function,
        }
    }

    /// latch `input` for the backward pass and return the function value, or
    /// 0.0 without touching the histograms if the edge is inactive.
    ///
    /// The input histogram records the raw input; clamping into the function
    /// domain happens inside the evaluation
    pub(crate) fn forward(&mut self, input: f64, record_histograms: bool) -> f64 {
        self.last_input = input;
        if !self.active {
            return 0.0;
        }
        if record_histograms {
            self.input_histogram.record(input);
        }
        let output = self.function.evaluate(input);
        if record_histograms {
            self.output_histogram.record(output);
        }
        output
    }

    /// add this example's per-control-point gradient, scaled by the
    /// destination node's error derivative, into the running accumulator.
    /// No-op if the edge is inactive
    pub(crate) fn accumulate_gradients(&mut self, output_gradient: f64) {
        if !self.active {
            return;
        }
        let gradients = self.function.control_point_gradients(self.last_input);
        for (accumulated, gradient) in self.accumulated_gradients.iter_mut().zip(gradients.iter()) {
            *accumulated += output_gradient * gradient;
        }
        self.num_accumulated += 1;
    }

    /// apply the mean of the accumulated gradients to the control points, then
    /// clear the accumulator. No-op if the edge is inactive or no examples
    /// have been accumulated since the last update
    pub(crate) fn update_parameters(&mut self, learning_rate: f64) {
        if !self.active || self.num_accumulated == 0 {
            return;
        }
        let example_count = self.num_accumulated as f64;
        for accumulated in self.accumulated_gradients.iter_mut() {
            *accumulated /= example_count;
        }
        self.function
            .update_parameters(&self.accumulated_gradients, learning_rate);
        self.zero_gradients();
    }

    /// clear the gradient accumulator and example count without touching the parameters
    pub(crate) fn zero_gradients(&mut self) {
        for accumulated in self.accumulated_gradients.iter_mut() {
            *accumulated = 0.0;
        }
        self.num_accumulated = 0;
    }

    pub(crate) fn reset_histograms(&mut self) {
        self.input_histogram.reset();
        self.output_histogram.reset();
    }

    /// widen both histograms' display ranges to their observed ranges plus
    /// padding. Opt-in; the fixed default range is the function domain
    pub fn recalibrate_histograms(&mut self) {
        self.input_histogram.recalibrate();
        self.output_histogram.recalibrate();
    }

    /// the display identifier, `"<source id>-<dest id>"`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// arena index of the source node
    pub fn source(&self) -> usize {
        self.source
    }

    /// arena index of the destination node
    pub fn dest(&self) -> usize {
        self.dest
    }

    /// the learnable function this edge applies to values travelling down it
    pub fn function(&self) -> &LearnableFunction {
        &self.function
    }

    /// mutable access to the function, for hosts that edit control points directly
    pub fn function_mut(&mut self) -> &mut LearnableFunction {
        &mut self.function
    }

    /// whether this edge currently participates in forward and backward passes
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// enable or disable this edge. An inactive edge contributes zero to its
    /// destination node, never accumulates gradients, and never updates its
    /// parameters
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// the input latched by the most recent forward pass
    pub fn last_input(&self) -> f64 {
        self.last_input
    }

    /// histogram of raw inputs seen by this edge
    pub fn input_histogram(&self) -> &ActivationHistogram {
        &self.input_histogram
    }

    /// histogram of outputs produced by this edge
    pub fn output_histogram(&self) -> &ActivationHistogram {
        &self.output_histogram
    }
}

impl PartialEq for KanEdge {
    // identity only: latched inputs, gradient buffers, and histograms are
    // operating state and excluded from comparison
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.source == other.source
            && self.dest == other.dest
            && self.active == other.active
            && self.function == other.function
    }
}
