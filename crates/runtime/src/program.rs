//! Compiled programs.
//!
//! [`CompiledCode`] is the artifact produced by the compiler and executed by
//! the interpreter: a flat instruction stream plus the side tables it
//! references. It is built once per source graph and immutable afterwards.

use std::fmt;
use std::rc::Rc;

use ripple_graph::{EvaluateFn, Number};

use crate::instruction::{Instruction, ResultIndex};

/// Key identifying one result slot, a dotted path such as `"add1"` or
/// `"sfg1.bfly1.0"`. Top-level outputs use their output index.
pub type ResultKey = String;

/// A host-defined operation referenced by `Custom` instructions.
#[derive(Clone)]
pub struct CustomOperation {
    /// Callable evaluating one output from popped input values.
    pub evaluate: EvaluateFn,
    /// Number of values popped per evaluation.
    pub input_count: usize,
    /// Number of outputs the callable can produce.
    pub output_count: usize,
}

impl fmt::Debug for CustomOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperation")
            .field("input_count", &self.input_count)
            .field("output_count", &self.output_count)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomOperation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.evaluate, &other.evaluate)
            && self.input_count == other.input_count
            && self.output_count == other.output_count
    }
}

/// One `Custom` instruction site: which operation it calls and which of that
/// operation's outputs it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomSource {
    /// Index into [`CompiledCode::custom_operations`].
    pub custom_operation_index: usize,
    /// Output index requested from the operation.
    pub output_index: usize,
}

/// One delay register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayInfo {
    /// Register value at iteration 0.
    pub initial_value: Number,
    /// Result slot that exposes the register's pre-iteration value.
    pub result_index: ResultIndex,
}

/// A compiled simulation program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCode {
    /// Instructions for one full iteration, in execution order.
    pub instructions: Vec<Instruction>,
    /// Host-defined operations used by the program.
    pub custom_operations: Vec<CustomOperation>,
    /// Signal sources that consume custom-operation outputs.
    pub custom_sources: Vec<CustomSource>,
    /// Delay registers, ordered by first encounter during compilation.
    pub delays: Vec<DelayInfo>,
    /// Keys for each result slot; the slot at `result_keys.len()` is the
    /// ignored sink.
    pub result_keys: Vec<ResultKey>,
    /// Number of values expected as input per iteration.
    pub input_count: usize,
    /// Number of values left on the stack after a full iteration.
    pub output_count: usize,
    /// High-water mark of the evaluation stack.
    pub required_stack_size: usize,
}

impl fmt::Display for CompiledCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "program: {} in, {} out, stack {}",
            self.input_count, self.output_count, self.required_stack_size
        )?;
        for (i, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:4}: {instruction}")?;
        }
        for (i, key) in self.result_keys.iter().enumerate() {
            writeln!(f, "result {i}: {key}")?;
        }
        Ok(())
    }
}
