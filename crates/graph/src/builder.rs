//! Graph assembly.
//!
//! [`SfgBuilder`] is the front end for constructing signal-flow graphs: one
//! method per operation kind, returning [`PortRef`] handles that later calls
//! consume as sources. Feedback edges (delay inputs) are wired after the fact
//! with [`SfgBuilder::connect`].

use std::collections::HashMap;

use crate::error::GraphError;
use crate::number::Number;
use crate::operation::{CustomOp, Operation, OperationKind};
use crate::sfg::{NodeId, Sfg};
use crate::signal::{Signal, SignalSource};

/// Handle to one output of an operation under construction.
///
/// Passing a `PortRef` as a source wires a signal from that output. The
/// handle optionally carries a quantization bit width for the edge it will
/// create; see [`PortRef::quantized`].
#[derive(Debug, Clone, Copy)]
pub struct PortRef {
    /// Operation the handle refers to.
    pub node: NodeId,
    /// Output index on that operation.
    pub output: usize,
    bits: Option<u8>,
}

impl PortRef {
    /// Request quantization of the value crossing the edge this handle is
    /// used to create. A width of 0 disables quantization again.
    pub fn quantized(self, bits: u8) -> Self {
        Self { bits: Some(bits), ..self }
    }
}

/// Node under construction: inputs stay optional until [`SfgBuilder::build`].
#[derive(Debug, Clone)]
struct Draft {
    graph_id: String,
    kind: OperationKind,
    inputs: Vec<Option<Signal>>,
}

/// Builder for [`Sfg`] graphs.
#[derive(Default)]
pub struct SfgBuilder {
    nodes: Vec<Draft>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    counters: HashMap<String, usize>,
}

impl SfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a graph input.
    pub fn input(&mut self) -> PortRef {
        let node = self.alloc(OperationKind::Input);
        self.inputs.push(node);
        port(node, 0)
    }

    /// Add a graph output fed by `source`.
    pub fn output(&mut self, source: PortRef) {
        let node = self.alloc(OperationKind::Output);
        self.wire(node, 0, source);
        self.outputs.push(node);
    }

    /// Add a constant source.
    pub fn constant(&mut self, value: impl Into<Number>) -> PortRef {
        port(self.alloc(OperationKind::Constant(value.into())), 0)
    }

    pub fn add(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Add, a, b)
    }

    pub fn sub(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Sub, a, b)
    }

    pub fn mul(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Mul, a, b)
    }

    pub fn div(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Div, a, b)
    }

    pub fn min(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Min, a, b)
    }

    pub fn max(&mut self, a: PortRef, b: PortRef) -> PortRef {
        self.binary(OperationKind::Max, a, b)
    }

    pub fn sqrt(&mut self, a: PortRef) -> PortRef {
        self.unary(OperationKind::Sqrt, a)
    }

    pub fn conj(&mut self, a: PortRef) -> PortRef {
        self.unary(OperationKind::Conj, a)
    }

    pub fn abs(&mut self, a: PortRef) -> PortRef {
        self.unary(OperationKind::Abs, a)
    }

    /// Multiply by a compile-time coefficient.
    pub fn const_mul(&mut self, coefficient: impl Into<Number>, a: PortRef) -> PortRef {
        self.unary(OperationKind::ConstMul(coefficient.into()), a)
    }

    /// Radix-2 butterfly; returns the `a + b` and `a - b` outputs.
    pub fn butterfly(&mut self, a: PortRef, b: PortRef) -> (PortRef, PortRef) {
        let node = self.alloc(OperationKind::Butterfly);
        self.wire(node, 0, a);
        self.wire(node, 1, b);
        (port(node, 0), port(node, 1))
    }

    /// Add a one-sample delay. Its input is left unconnected so feedback
    /// loops can be closed later with [`SfgBuilder::connect`].
    pub fn delay(&mut self, initial_value: impl Into<Number>) -> PortRef {
        port(self.alloc(OperationKind::Delay(initial_value.into())), 0)
    }

    /// Wire `source` into input `input` of `node`. Used to close feedback
    /// loops; re-wiring an already-connected input replaces the edge.
    pub fn connect(&mut self, source: PortRef, node: NodeId, input: usize) {
        self.wire(node, input, source);
    }

    /// Embed a host-defined operation; returns one handle per output.
    pub fn custom(&mut self, op: CustomOp, inputs: &[PortRef]) -> Vec<PortRef> {
        assert_eq!(
            inputs.len(),
            op.input_count,
            "custom operation {} expects {} inputs",
            op.name,
            op.input_count
        );
        let node = self.alloc(OperationKind::Custom(op));
        for (i, source) in inputs.iter().enumerate() {
            self.wire(node, i, *source);
        }
        let outputs = self.nodes[node.0].kind.output_count();
        (0..outputs).map(|i| port(node, i)).collect()
    }

    /// Embed a nested graph; returns one handle per subgraph output.
    pub fn subgraph(&mut self, inner: Sfg, inputs: &[PortRef]) -> Vec<PortRef> {
        assert_eq!(
            inputs.len(),
            inner.input_count(),
            "subgraph expects {} inputs",
            inner.input_count()
        );
        let outputs = inner.output_count();
        let node = self.alloc(OperationKind::Sfg(inner));
        for (i, source) in inputs.iter().enumerate() {
            self.wire(node, i, *source);
        }
        (0..outputs).map(|i| port(node, i)).collect()
    }

    /// Finalize the graph, verifying that every input is wired.
    pub fn build(self) -> Result<Sfg, GraphError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for draft in self.nodes {
            let mut inputs = Vec::with_capacity(draft.inputs.len());
            for (i, signal) in draft.inputs.into_iter().enumerate() {
                inputs.push(signal.ok_or_else(|| GraphError::UnconnectedInput {
                    operation: draft.graph_id.clone(),
                    input: i,
                })?);
            }
            nodes.push(Operation {
                graph_id: draft.graph_id,
                kind: draft.kind,
                inputs,
            });
        }
        Ok(Sfg {
            nodes,
            inputs: self.inputs,
            outputs: self.outputs,
        })
    }

    fn binary(&mut self, kind: OperationKind, a: PortRef, b: PortRef) -> PortRef {
        let node = self.alloc(kind);
        self.wire(node, 0, a);
        self.wire(node, 1, b);
        port(node, 0)
    }

    fn unary(&mut self, kind: OperationKind, a: PortRef) -> PortRef {
        let node = self.alloc(kind);
        self.wire(node, 0, a);
        port(node, 0)
    }

    fn alloc(&mut self, kind: OperationKind) -> NodeId {
        let stem = kind.type_name().to_string();
        let count = self.counters.entry(stem.clone()).or_insert(0);
        *count += 1;
        let node = NodeId(self.nodes.len());
        self.nodes.push(Draft {
            graph_id: format!("{stem}{count}"),
            inputs: vec![None; kind.input_count()],
            kind,
        });
        node
    }

    fn wire(&mut self, node: NodeId, input: usize, source: PortRef) {
        let draft = &mut self.nodes[node.0];
        assert!(
            input < draft.inputs.len(),
            "operation {} has no input {input}",
            draft.graph_id
        );
        draft.inputs[input] = Some(Signal {
            source: SignalSource {
                node: source.node,
                output: source.output,
            },
            bits: source.bits,
        });
    }
}

fn port(node: NodeId, output: usize) -> PortRef {
    PortRef {
        node,
        output,
        bits: None,
    }
}
