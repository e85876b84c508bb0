//! Error types for parameter validation and tensor conversion.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuantError>;

#[derive(Error, Debug)]
pub enum QuantError {
    /// Scale is zero, negative, or not a finite number.
    #[error("Invalid scale for {tensor}: {scale}\n  → Scale must be a finite value greater than zero")]
    InvalidScale { tensor: String, scale: f32 },

    /// Two descriptors in the same group claim the same model slot.
    #[error("Duplicate {group} tensor index {index} ({first} and {second})\n  → Each tensor needs its own slot")]
    DuplicateTensorIndex {
        group: &'static str,
        index: usize,
        first: String,
        second: String,
    },

    #[error("Tensor index {index} for {tensor} is out of range (model has {count} {group} tensors)")]
    TensorIndexOutOfRange {
        tensor: String,
        group: &'static str,
        index: usize,
        count: usize,
    },

    #[error("Tensor shape mismatch for {tensor}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        tensor: String,
        expected: usize,
        actual: usize,
    },

    /// NaN or infinite reading, usually a dead or disconnected sensor.
    #[error("Non-finite value {value} in {tensor} at position {position}\n  → Check the sensor before running inference")]
    NonFiniteInput {
        tensor: String,
        position: usize,
        value: f32,
    },

    #[error("Model output slot {index} for {tensor} is missing (got {available} outputs)")]
    MissingTensorSlot {
        tensor: String,
        index: usize,
        available: usize,
    },

    /// A model tensor could not be identified from tensor lengths alone.
    #[error("Cannot identify {tensor} tensor: {matches} tensors have length {length}\n  → Check the deployed model's tensor list by hand")]
    AmbiguousTensor {
        tensor: String,
        length: usize,
        matches: usize,
    },

    /// Configured index disagrees with what the deployed model exposes.
    #[error("Tensor index mismatch for {tensor}: configured {configured}, model has it at {actual}\n  → Update the parameter table before deploying")]
    IndexMismatch {
        tensor: String,
        configured: usize,
        actual: usize,
    },

    #[error("IO error reading {path}\n  Cause: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuantError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors caused by a parameter table that does not match the model.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Self::InvalidScale { .. }
                | Self::DuplicateTensorIndex { .. }
                | Self::TensorIndexOutOfRange { .. }
                | Self::AmbiguousTensor { .. }
                | Self::IndexMismatch { .. }
        )
    }
}
