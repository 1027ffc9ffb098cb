//! Graph arenas.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// Index of an operation within its owning [`Sfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// A signal-flow graph: an arena of operations plus ordered registration
/// lists for its input and output operations.
///
/// Cycles are expressed as plain index references, so feedback loops through
/// delay operations need no special ownership. Graphs are assembled with
/// [`SfgBuilder`](crate::builder::SfgBuilder) and are immutable afterwards.
#[derive(Debug, Clone)]
pub struct Sfg {
    pub(crate) nodes: Vec<Operation>,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) outputs: Vec<NodeId>,
}

impl Sfg {
    /// Look up an operation by id.
    pub fn node(&self, id: NodeId) -> &Operation {
        &self.nodes[id.0]
    }

    /// All operations, in creation order.
    pub fn nodes(&self) -> &[Operation] {
        &self.nodes
    }

    /// Input operations, in registration order.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Output operations, in registration order.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Number of graph inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of graph outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Position of the given operation in the input registration list.
    ///
    /// Identity comparison, not structural: `op` must be a reference into
    /// this graph's arena.
    pub fn input_position(&self, op: &Operation) -> Option<usize> {
        self.inputs
            .iter()
            .position(|id| std::ptr::eq(self.node(*id), op))
    }
}
