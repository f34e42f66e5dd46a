//! Errors
//!
//! Custom error types used throughout the `arbor` crate.
use thiserror::Error;

/// Errors that can occur during tree induction and pruning.
#[derive(Debug, Error)]
pub enum ArborError {
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// The designated target column cannot be predicted.
    #[error("Attribute {0} cannot be used as a target column.")]
    InvalidTarget(usize),
    /// Cursor descent into a slot that holds no subtree.
    #[error("Cannot descend into slot {0}: the slot is empty.")]
    EmptySlot(usize),
}
