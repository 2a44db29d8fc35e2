//! Error types with actionable diagnostics.
//!
//! Every failure a training run can hit is represented here with enough
//! context (epoch, batch index, offending value) to diagnose it without
//! re-running. Nothing is silently swallowed: data corruption and numeric
//! instability abort the run rather than skewing reward statistics.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seqgan operations.
pub type Result<T> = std::result::Result<T, SeqGanError>;

/// Errors that can occur during pretraining or adversarial training.
#[derive(Error, Debug)]
pub enum SeqGanError {
    /// A batch with zero sequences or zero-length sequences was supplied.
    #[error("Empty batch: {context}\n  → Check the dataset file and batch_size")]
    EmptyBatch { context: String },

    /// A token id outside the configured vocabulary was encountered.
    #[error("Token id {token} at sequence {index} is outside the vocabulary (size {vocab_size})\n  → The dataset does not match vocab_size in the config")]
    TokenOutOfRange {
        index: usize,
        token: u32,
        vocab_size: usize,
    },

    /// A tensor or batch had an unexpected shape.
    #[error("Shape mismatch for '{name}': expected {expected} elements, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A loss or reward became NaN/Inf. Fatal: parameters may be corrupted.
    #[error("Non-finite {phase} loss {value} at epoch {epoch}, batch {batch}\n  → Lower learning_rate or tighten max_grad_norm; the run cannot continue safely")]
    NonFiniteLoss {
        phase: &'static str,
        epoch: usize,
        batch: usize,
        value: f32,
    },

    /// A required pretrained checkpoint was not found.
    ///
    /// The adversarial phase mandates pretrained weights as a precondition,
    /// not an optional warm start.
    #[error("Pretrained checkpoint not found: {path}\n  → Run the matching pretrain command first")]
    CheckpointMissing { path: PathBuf },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}")]
    Config { field: String, message: String },
}

impl SeqGanError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True if the error points at user-fixable input (config or data)
    /// rather than an internal failure of the training process.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyBatch { .. }
                | Self::TokenOutOfRange { .. }
                | Self::CheckpointMissing { .. }
                | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_loss_carries_location() {
        let err = SeqGanError::NonFiniteLoss {
            phase: "generator",
            epoch: 3,
            batch: 17,
            value: f32::NAN,
        };
        let msg = err.to_string();
        assert!(msg.contains("generator"));
        assert!(msg.contains("epoch 3"));
        assert!(msg.contains("batch 17"));
    }

    #[test]
    fn test_token_out_of_range_message() {
        let err = SeqGanError::TokenOutOfRange {
            index: 4,
            token: 99,
            vocab_size: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("99"));
        assert!(msg.contains("10"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_checkpoint_missing_is_user_error() {
        let err = SeqGanError::CheckpointMissing {
            path: "checkpoints/gen_states.json".into(),
        };
        assert!(err.is_user_error());
        assert!(err.to_string().contains("pretrain"));
    }

    #[test]
    fn test_internal_errors_are_not_user_errors() {
        let err = SeqGanError::ShapeMismatch {
            name: "embedding.weight".into(),
            expected: 100,
            actual: 80,
        };
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_io_constructor() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SeqGanError::io("reading dataset", io);
        assert!(err.to_string().contains("reading dataset"));
    }
}
