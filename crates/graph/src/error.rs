//! Graph construction errors.

use thiserror::Error;

/// Errors reported when finalizing a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("input {input} of operation {operation} is not connected")]
    UnconnectedInput { operation: String, input: usize },
}
