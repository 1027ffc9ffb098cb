//! Signal edges.

use serde::{Deserialize, Serialize};

use crate::sfg::NodeId;

/// Source end of a signal: one output of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSource {
    /// Operation producing the value.
    pub node: NodeId,
    /// Output index on that operation.
    pub output: usize,
}

/// A directed edge carrying a sample from a source output to a sink input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Where the value comes from.
    pub source: SignalSource,
    /// Requested bit width for integer quantization of the value crossing
    /// this edge. `None` or `Some(0)` disables quantization; 1..=64 masks the
    /// real part to that many bits.
    pub bits: Option<u8>,
}
