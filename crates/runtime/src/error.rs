//! Runtime errors.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::executor::ExecutionError;

/// Runtime result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the simulation driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Graph compilation failed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// An iteration failed while executing.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// `set_input` received an index with no corresponding graph input.
    #[error("input index out of range (got {index}, input count {count})")]
    InputIndexOutOfRange { index: usize, count: usize },

    /// Fixed-length input sequences must all agree on their length.
    #[error("inconsistent input length for simulation (was {expected}, got {actual})")]
    InconsistentInputLength { expected: u32, actual: u32 },

    /// `set_inputs` received the wrong number of providers.
    #[error("wrong number of inputs supplied to simulation (expected {expected}, got {actual})")]
    WrongInputCount { expected: usize, actual: usize },

    /// Advancing by the requested number of iterations would overflow the
    /// iteration counter.
    #[error("simulation iteration overflow")]
    IterationOverflow,

    /// `run` requires a fixed input length.
    #[error("cannot run simulation without a fixed input length")]
    UnlimitedRun,
}
