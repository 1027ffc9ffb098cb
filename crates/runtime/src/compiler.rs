//! Graph compiler.
//!
//! Lowers a signal-flow graph into a flat [`CompiledCode`] program for the
//! stack-machine interpreter.
//!
//! # Compilation Strategy
//!
//! 1. Walk the graph depth-first, driven by its outputs
//! 2. Emit instructions in post-order so operands are on the stack
//! 3. Share already-emitted outputs through `PushResult` (CSE keyed on
//!    per-output identity)
//! 4. Defer delay updates to the end of the stream so feedback cycles are
//!    broken into a forward pass and a write-back pass
//! 5. Track stack depth and assign result slots as emission proceeds
//!
//! The only legal cycles pass through a delay operation; anything else is a
//! direct feedback loop and rejected.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ripple_graph::{CustomOp, Operation, OperationKind, Sfg};
use tracing::{debug, trace};

use crate::instruction::{quantization_mask, Instruction, InstructionKind, ResultIndex};
use crate::program::{CompiledCode, CustomOperation, CustomSource, DelayInfo, ResultKey};

/// Sentinel for "no result requested"; rewritten to the ignored-sink index
/// once the number of result slots is known.
const NO_RESULT: ResultIndex = ResultIndex::MAX;

/// Compilation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// An output depends on its own value without an intervening delay.
    #[error("direct feedback loop detected in simulation graph")]
    DirectFeedbackLoop,

    /// An input operation is not registered with the graph being traversed.
    #[error("stray input operation in simulation graph")]
    StrayInput,

    /// The emitted stream would pop more values than were pushed.
    #[error("input/output count mismatch in simulation graph")]
    IoCountMismatch,

    /// The result-index type cannot encode all result slots.
    #[error("graph requires too many results to be stored (limit: {limit})")]
    TooManyResults { limit: usize },

    /// A signal requests quantization beyond 64 bits.
    #[error("cannot quantize to more than 64 bits (got {bits})")]
    QuantizationTooWide { bits: u8 },
}

/// Compile a signal-flow graph into an executable program.
///
/// # Errors
///
/// Returns a [`CompileError`] when the graph contains a delay-free feedback
/// loop, a stray input, an edge wider than 64 bits, or more distinct results
/// than the result-index type can address.
pub fn compile(sfg: &Sfg) -> Result<CompiledCode, CompileError> {
    debug!(
        inputs = sfg.input_count(),
        outputs = sfg.output_count(),
        "compiling signal-flow graph"
    );
    let mut compiler = Compiler::new(sfg);
    for output in 0..sfg.output_count() {
        compiler.emit_root_output(output)?;
    }
    compiler.flush_deferred_delays()?;
    let code = compiler.finish();
    debug!(
        instructions = code.instructions.len(),
        results = code.result_keys.len(),
        stack = code.required_stack_size,
        "graph compiled"
    );
    trace!(%code, "compiled program");
    Ok(code)
}

/// Stable identity of one operation output, used for CSE and cycle checks.
///
/// Keys on the operation's address within the borrowed graph, so multi-output
/// nodes get independent entries per output while shared outputs collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OutputId(usize, usize);

impl OutputId {
    fn of(node: &Operation, output: usize) -> Self {
        Self(node as *const Operation as usize, output)
    }

    fn root(sfg: &Sfg, output: usize) -> Self {
        Self(sfg as *const Sfg as usize, output)
    }
}

/// One entered subgraph during traversal.
#[derive(Clone, Copy)]
struct Frame<'g> {
    /// The graph we are inside.
    inner: &'g Sfg,
    /// The subgraph node as it appears in its parent; `None` for the root.
    node: Option<&'g Operation>,
    /// Length of the key prefix in effect outside this frame.
    prefix_len: usize,
}

/// A delay whose input emission is postponed until all outputs are compiled.
struct DeferredDelay<'g> {
    delay_index: usize,
    graph: &'g Sfg,
    node: &'g Operation,
    prefix: String,
    stack: Vec<Frame<'g>>,
}

struct Compiler<'g> {
    root: &'g Sfg,
    code: CompiledCode,
    /// Outputs whose bodies are currently being emitted (cycle detection).
    incomplete_outputs: HashSet<OutputId>,
    /// Result slots already assigned to emitted outputs (CSE).
    result_indices: HashMap<OutputId, ResultIndex>,
    /// Custom operations interned by node identity.
    custom_operations: HashMap<usize, usize>,
    deferred_delays: Vec<DeferredDelay<'g>>,
    stack_depth: isize,
}

impl<'g> Compiler<'g> {
    fn new(root: &'g Sfg) -> Self {
        Self {
            root,
            code: CompiledCode {
                instructions: Vec::new(),
                custom_operations: Vec::new(),
                custom_sources: Vec::new(),
                delays: Vec::new(),
                result_keys: Vec::new(),
                input_count: root.input_count(),
                output_count: root.output_count(),
                required_stack_size: 0,
            },
            incomplete_outputs: HashSet::new(),
            result_indices: HashMap::new(),
            custom_operations: HashMap::new(),
            deferred_delays: Vec::new(),
            stack_depth: 0,
        }
    }

    fn emit_root_output(&mut self, output: usize) -> Result<(), CompileError> {
        let id = OutputId::root(self.root, output);
        let Some(result) = self.begin_output(id, false, || output.to_string())? else {
            return Ok(());
        };
        let output_op = self.root.node(self.root.outputs()[output]);
        let frame = Frame {
            inner: self.root,
            node: None,
            prefix_len: 0,
        };
        self.emit_source(self.root, output_op, 0, "", &[frame])?;
        self.push_instruction(InstructionKind::ForwardValue, result, 0)?;
        self.end_output(id);
        Ok(())
    }

    /// Emit the value of one input signal: recurse into its source, then
    /// apply edge quantization if the signal requests it.
    fn emit_source(
        &mut self,
        graph: &'g Sfg,
        node: &'g Operation,
        input: usize,
        prefix: &str,
        stack: &[Frame<'g>],
    ) -> Result<(), CompileError> {
        let signal = node.inputs[input];
        let source = graph.node(signal.source.node);
        self.emit_operation_output(graph, source, signal.source.output, prefix, stack)?;
        match signal.bits {
            Some(bits) if bits > 64 => {
                return Err(CompileError::QuantizationTooWide { bits });
            }
            Some(0) | None => {}
            Some(bits) => {
                self.push_instruction(
                    InstructionKind::Quantize(quantization_mask(bits)),
                    NO_RESULT,
                    0,
                )?;
            }
        }
        Ok(())
    }

    fn emit_operation_output(
        &mut self,
        graph: &'g Sfg,
        node: &'g Operation,
        output: usize,
        prefix: &str,
        stack: &[Frame<'g>],
    ) -> Result<(), CompileError> {
        // Output sinks forward their source without a result slot of their own.
        if matches!(node.kind, OperationKind::Output) {
            return self.emit_source(graph, node, 0, prefix, stack);
        }

        let id = OutputId::of(node, output);
        let allow_cycle = matches!(node.kind, OperationKind::Delay(_));
        let Some(result) = self.begin_output(id, allow_cycle, || key_of_output(node, output, prefix))?
        else {
            return Ok(());
        };

        match &node.kind {
            OperationKind::Constant(value) => {
                self.push_instruction(InstructionKind::PushConstant(*value), result, 1)?;
            }
            OperationKind::Add => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Add, result)?;
            }
            OperationKind::Sub => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Sub, result)?;
            }
            OperationKind::Mul => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Mul, result)?;
            }
            OperationKind::Div => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Div, result)?;
            }
            OperationKind::Min => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Min, result)?;
            }
            OperationKind::Max => {
                self.emit_binary(graph, node, prefix, stack, InstructionKind::Max, result)?;
            }
            OperationKind::Sqrt => {
                self.emit_unary(graph, node, prefix, stack, InstructionKind::Sqrt, result)?;
            }
            OperationKind::Conj => {
                self.emit_unary(graph, node, prefix, stack, InstructionKind::Conj, result)?;
            }
            OperationKind::Abs => {
                self.emit_unary(graph, node, prefix, stack, InstructionKind::Abs, result)?;
            }
            OperationKind::ConstMul(value) => {
                self.emit_unary(graph, node, prefix, stack, InstructionKind::ConstMul(*value), result)?;
            }
            OperationKind::Butterfly => {
                self.emit_source(graph, node, 0, prefix, stack)?;
                self.emit_source(graph, node, 1, prefix, stack)?;
                let kind = if output == 0 {
                    InstructionKind::Add
                } else {
                    InstructionKind::Sub
                };
                self.push_instruction(kind, result, -1)?;
            }
            OperationKind::Input => {
                let frame = stack.last().ok_or(CompileError::StrayInput)?;
                let input_index = frame
                    .inner
                    .input_position(node)
                    .ok_or(CompileError::StrayInput)?;
                if stack.len() == 1 {
                    self.push_instruction(InstructionKind::PushInput(input_index), result, 1)?;
                } else {
                    // Forward from the enclosing graph: the subgraph node's
                    // own input feeds this inner input operation.
                    let parent = frame
                        .node
                        .expect("compiler bug: nested frame without an sfg node");
                    let outer_graph = stack[stack.len() - 2].inner;
                    let outer_prefix = &prefix[..frame.prefix_len];
                    let outer_stack = &stack[..stack.len() - 1];
                    self.emit_source(outer_graph, parent, input_index, outer_prefix, outer_stack)?;
                    self.push_instruction(InstructionKind::ForwardValue, result, 0)?;
                }
            }
            OperationKind::Delay(initial) => {
                let delay_index = self.code.delays.len();
                self.code.delays.push(DelayInfo {
                    initial_value: *initial,
                    result_index: result,
                });
                self.deferred_delays.push(DeferredDelay {
                    delay_index,
                    graph,
                    node,
                    prefix: prefix.to_string(),
                    stack: stack.to_vec(),
                });
                self.push_instruction(InstructionKind::PushDelay(delay_index), result, 1)?;
            }
            OperationKind::Sfg(inner) => {
                let output_op = inner.node(inner.outputs()[output]);
                let inner_prefix = key_base(node, prefix);
                let mut inner_stack = stack.to_vec();
                inner_stack.push(Frame {
                    inner,
                    node: Some(node),
                    prefix_len: prefix.len(),
                });
                self.emit_source(inner, output_op, 0, &inner_prefix, &inner_stack)?;
                self.push_instruction(InstructionKind::ForwardValue, result, 0)?;
            }
            OperationKind::Custom(op) => {
                let operation_index = self.intern_custom(node, op);
                for input in 0..op.input_count {
                    self.emit_source(graph, node, input, prefix, stack)?;
                }
                let source_index = self.code.custom_sources.len();
                self.code.custom_sources.push(CustomSource {
                    custom_operation_index: operation_index,
                    output_index: output,
                });
                let stack_diff = 1 - op.input_count as isize;
                self.push_instruction(InstructionKind::Custom(source_index), result, stack_diff)?;
            }
            OperationKind::Output => unreachable!("output sinks are forwarded above"),
        }

        self.end_output(id);
        Ok(())
    }

    fn emit_unary(
        &mut self,
        graph: &'g Sfg,
        node: &'g Operation,
        prefix: &str,
        stack: &[Frame<'g>],
        kind: InstructionKind,
        result: ResultIndex,
    ) -> Result<(), CompileError> {
        self.emit_source(graph, node, 0, prefix, stack)?;
        self.push_instruction(kind, result, 0)
    }

    fn emit_binary(
        &mut self,
        graph: &'g Sfg,
        node: &'g Operation,
        prefix: &str,
        stack: &[Frame<'g>],
        kind: InstructionKind,
        result: ResultIndex,
    ) -> Result<(), CompileError> {
        self.emit_source(graph, node, 0, prefix, stack)?;
        self.emit_source(graph, node, 1, prefix, stack)?;
        self.push_instruction(kind, result, -1)
    }

    /// Start emitting one operation output.
    ///
    /// Returns the freshly assigned result slot, or `None` when the output
    /// was already emitted and a `PushResult` re-use was generated instead.
    fn begin_output(
        &mut self,
        id: OutputId,
        allow_cycle: bool,
        key: impl FnOnce() -> ResultKey,
    ) -> Result<Option<ResultIndex>, CompileError> {
        if self.incomplete_outputs.contains(&id) && !allow_cycle {
            return Err(CompileError::DirectFeedbackLoop);
        }
        if let Some(&index) = self.result_indices.get(&id) {
            self.push_instruction(InstructionKind::PushResult(index as usize), index, 1)?;
            return Ok(None);
        }
        if self.code.result_keys.len() >= NO_RESULT as usize {
            return Err(CompileError::TooManyResults {
                limit: NO_RESULT as usize,
            });
        }
        let index = self.code.result_keys.len() as ResultIndex;
        self.code.result_keys.push(key());
        self.result_indices.insert(id, index);
        self.incomplete_outputs.insert(id);
        Ok(Some(index))
    }

    fn end_output(&mut self, id: OutputId) {
        let removed = self.incomplete_outputs.remove(&id);
        debug_assert!(removed, "compiler bug: output was not in progress");
    }

    fn intern_custom(&mut self, node: &'g Operation, op: &CustomOp) -> usize {
        let key = node as *const Operation as usize;
        if let Some(&index) = self.custom_operations.get(&key) {
            return index;
        }
        let index = self.code.custom_operations.len();
        self.code.custom_operations.push(CustomOperation {
            evaluate: Rc::clone(&op.evaluate),
            input_count: op.input_count,
            output_count: op.output_count,
        });
        self.custom_operations.insert(key, index);
        index
    }

    /// Emit the postponed delay write-backs. Each update evaluates the delay
    /// node's input and pops it into the register; evaluating one delay may
    /// reach delays not seen during the forward pass, so drain in rounds.
    fn flush_deferred_delays(&mut self) -> Result<(), CompileError> {
        while !self.deferred_delays.is_empty() {
            let batch = std::mem::take(&mut self.deferred_delays);
            for deferred in batch {
                self.emit_source(deferred.graph, deferred.node, 0, &deferred.prefix, &deferred.stack)?;
                self.push_instruction(
                    InstructionKind::UpdateDelay(deferred.delay_index),
                    NO_RESULT,
                    -1,
                )?;
            }
        }
        Ok(())
    }

    fn push_instruction(
        &mut self,
        kind: InstructionKind,
        result_index: ResultIndex,
        stack_diff: isize,
    ) -> Result<(), CompileError> {
        self.stack_depth += stack_diff;
        if self.stack_depth < 0 {
            return Err(CompileError::IoCountMismatch);
        }
        let depth = self.stack_depth as usize;
        if depth > self.code.required_stack_size {
            self.code.required_stack_size = depth;
        }
        self.code.instructions.push(Instruction { kind, result_index });
        Ok(())
    }

    fn finish(mut self) -> CompiledCode {
        let sink = self.code.result_keys.len() as ResultIndex;
        for instruction in &mut self.code.instructions {
            if instruction.result_index == NO_RESULT {
                instruction.result_index = sink;
            }
        }
        self.code
    }
}

fn key_base(node: &Operation, prefix: &str) -> String {
    if prefix.is_empty() {
        node.graph_id.clone()
    } else {
        format!("{prefix}.{}", node.graph_id)
    }
}

fn key_of_output(node: &Operation, output: usize, prefix: &str) -> ResultKey {
    let base = key_base(node, prefix);
    if base.is_empty() {
        output.to_string()
    } else if node.kind.output_count() == 1 {
        base
    } else {
        format!("{base}.{output}")
    }
}

#[cfg(test)]
mod tests;
