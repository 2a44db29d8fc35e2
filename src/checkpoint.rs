//! Checkpoint persistence.
//!
//! A checkpoint bundles model parameters, optimizer state, and the epoch's
//! losses into one JSON file. Saving is gated by the epoch driver on a
//! strict validation-loss improvement, so the file on disk always holds
//! the best snapshot seen so far. Loading a missing pretrained checkpoint
//! is fatal: the adversarial phase mandates pretrained weights.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SeqGanError};
use crate::optim::AdamState;

/// One named flat parameter tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorState {
    pub name: String,
    pub data: Vec<f32>,
}

/// A full training snapshot for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 1-based epoch the snapshot was taken at.
    pub epoch: usize,
    /// Named model parameters.
    pub model: Vec<TensorState>,
    /// Optimizer state (moments and step count).
    pub optimizer: AdamState,
    /// Training loss of that epoch.
    pub train_loss: f32,
    /// Validation loss of that epoch (the selection key).
    pub valid_loss: f32,
}

/// Serialize a checkpoint to `path`, creating parent directories.
pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SeqGanError::io(format!("creating {}", parent.display()), e))?;
    }
    let data = serde_json::to_string(checkpoint).map_err(|e| SeqGanError::Serialization {
        message: format!("checkpoint serialization failed: {e}"),
    })?;
    std::fs::write(path, data)
        .map_err(|e| SeqGanError::io(format!("writing checkpoint {}", path.display()), e))
}

/// Load a checkpoint from `path`.
///
/// # Errors
///
/// `CheckpointMissing` when the file does not exist; callers treat this
/// as fatal at startup, never as an optional warm start.
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SeqGanError::CheckpointMissing {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SeqGanError::io(format!("reading checkpoint {}", path.display()), e))?;
    serde_json::from_str(&content).map_err(|e| SeqGanError::Serialization {
        message: format!("checkpoint {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{Adam, Optimizer};
    use crate::autograd::Tensor;

    fn sample_checkpoint() -> Checkpoint {
        let mut optimizer = Adam::default_params(0.01);
        let mut params = vec![Tensor::from_vec(vec![1.0, -2.0], true)];
        params[0].set_grad(ndarray::arr1(&[0.5, 0.5]));
        optimizer.step(&mut params);

        Checkpoint {
            epoch: 3,
            model: vec![TensorState {
                name: "embedding.weight".into(),
                data: params[0].to_vec(),
            }],
            optimizer: optimizer.state(),
            train_loss: 1.25,
            valid_loss: 1.5,
        }
    }

    #[test]
    fn test_checkpoint_roundtrip_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen_states.json");

        let original = sample_checkpoint();
        save_checkpoint(&original, &path).unwrap();
        let loaded = load_checkpoint(&path).unwrap();

        assert_eq!(loaded.epoch, original.epoch);
        assert_eq!(loaded.model[0].data, original.model[0].data);
        assert_eq!(
            loaded.optimizer.first_moments,
            original.optimizer.first_moments
        );
        assert_eq!(loaded.train_loss.to_bits(), original.train_loss.to_bits());
        assert_eq!(loaded.valid_loss.to_bits(), original.valid_loss.to_bits());
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let err = load_checkpoint("/nonexistent/dir/gen_states.json").unwrap_err();
        assert!(matches!(err, SeqGanError::CheckpointMissing { .. }));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/states.json");
        save_checkpoint(&sample_checkpoint(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_checkpoint_reports_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_checkpoint(&path).unwrap_err();
        assert!(matches!(err, SeqGanError::Serialization { .. }));
    }
}
