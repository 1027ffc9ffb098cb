//! ripple runtime
//!
//! Compiles signal-flow graphs to flat stack-machine programs and executes
//! them one iteration at a time.

pub mod compiler;
pub mod error;
pub mod executor;
pub mod instruction;
pub mod program;
pub mod simulation;


pub use compiler::{compile, CompileError};
pub use error::{Error, Result};
pub use executor::{run_iteration, ExecutionError, SimulationState};
pub use instruction::{Instruction, InstructionKind, ResultIndex};
pub use program::{CompiledCode, CustomOperation, CustomSource, DelayInfo, ResultKey};
pub use simulation::{InputFn, InputProvider, Simulation};
