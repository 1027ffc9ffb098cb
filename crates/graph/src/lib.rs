//! Signal-flow-graph model
//!
//! Defines the node, signal, and graph types consumed by the simulation
//! compiler, plus a builder for assembling graphs.

pub mod builder;
pub mod error;
pub mod number;
pub mod operation;
pub mod sfg;
pub mod signal;

pub use builder::{PortRef, SfgBuilder};
pub use error::GraphError;
pub use number::Number;
pub use operation::{CustomOp, EvaluateFn, Operation, OperationKind};
pub use sfg::{NodeId, Sfg};
pub use signal::{Signal, SignalSource};
