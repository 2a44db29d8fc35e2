//! Sequence datasets and batching.
//!
//! Datasets are JSON files holding a list of token-id sequences. Loading
//! validates every id against the configured vocabulary and every length
//! against the configured maximum; a violation is fatal, since a training
//! run cannot safely continue on corrupted inputs. Batches are right-padded
//! to a common length so every batch in a run has shape
//! `[batch_size, max_len]`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;

use crate::error::{Result, SeqGanError};
use crate::train::TrainConfig;

/// A batch of token-id sequences, row-major `[batch_size, seq_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBatch {
    /// Flattened token ids.
    pub tokens: Vec<u32>,
    /// Number of sequences.
    pub batch_size: usize,
    /// Common (padded) sequence length.
    pub seq_len: usize,
}

impl SequenceBatch {
    /// Create a batch from flat storage.
    pub fn new(tokens: Vec<u32>, batch_size: usize, seq_len: usize) -> Result<Self> {
        if batch_size == 0 || seq_len == 0 {
            return Err(SeqGanError::EmptyBatch {
                context: format!("batch_size={batch_size}, seq_len={seq_len}"),
            });
        }
        if tokens.len() != batch_size * seq_len {
            return Err(SeqGanError::ShapeMismatch {
                name: "SequenceBatch.tokens".into(),
                expected: batch_size * seq_len,
                actual: tokens.len(),
            });
        }
        Ok(Self {
            tokens,
            batch_size,
            seq_len,
        })
    }

    /// Build a batch by right-padding `sequences` to `seq_len`.
    pub fn from_sequences(sequences: &[Vec<u32>], seq_len: usize, pad_idx: u32) -> Result<Self> {
        if sequences.is_empty() {
            return Err(SeqGanError::EmptyBatch {
                context: "no sequences to batch".into(),
            });
        }
        let mut tokens = Vec::with_capacity(sequences.len() * seq_len);
        for (i, seq) in sequences.iter().enumerate() {
            if seq.len() > seq_len {
                return Err(SeqGanError::ShapeMismatch {
                    name: format!("sequence {i}"),
                    expected: seq_len,
                    actual: seq.len(),
                });
            }
            tokens.extend_from_slice(seq);
            tokens.extend(std::iter::repeat_n(pad_idx, seq_len - seq.len()));
        }
        Self::new(tokens, sequences.len(), seq_len)
    }

    /// Row `b` as a slice.
    pub fn row(&self, b: usize) -> &[u32] {
        &self.tokens[b * self.seq_len..(b + 1) * self.seq_len]
    }

    /// Column `t`: the token at position `t` of every sequence.
    pub fn column(&self, t: usize) -> Vec<u32> {
        (0..self.batch_size)
            .map(|b| self.tokens[b * self.seq_len + t])
            .collect()
    }

    /// The first `len` tokens of every sequence as a new batch.
    pub fn prefix(&self, len: usize) -> SequenceBatch {
        assert!(len > 0 && len <= self.seq_len);
        let mut tokens = Vec::with_capacity(self.batch_size * len);
        for b in 0..self.batch_size {
            tokens.extend_from_slice(&self.tokens[b * self.seq_len..b * self.seq_len + len]);
        }
        SequenceBatch {
            tokens,
            batch_size: self.batch_size,
            seq_len: len,
        }
    }

    /// Each row repeated `n` consecutive times, for batched Monte-Carlo
    /// rollouts: row b of the result block `b*n..(b+1)*n` is row b here.
    pub fn repeat_rows(&self, n: usize) -> SequenceBatch {
        assert!(n > 0);
        let mut tokens = Vec::with_capacity(self.tokens.len() * n);
        for b in 0..self.batch_size {
            let row = self.row(b);
            for _ in 0..n {
                tokens.extend_from_slice(row);
            }
        }
        SequenceBatch {
            tokens,
            batch_size: self.batch_size * n,
            seq_len: self.seq_len,
        }
    }

    /// Validate every token id against a vocabulary bound.
    pub fn check_vocab(&self, vocab_size: usize) -> Result<()> {
        for (i, &token) in self.tokens.iter().enumerate() {
            if token as usize >= vocab_size {
                return Err(SeqGanError::TokenOutOfRange {
                    index: i / self.seq_len,
                    token,
                    vocab_size,
                });
            }
        }
        Ok(())
    }
}

/// In-memory dataset of variable-length token sequences.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    sequences: Vec<Vec<u32>>,
    max_len: usize,
    pad_idx: u32,
}

impl SequenceDataset {
    /// Wrap pre-tokenized sequences, validating ids and lengths.
    pub fn from_sequences(
        sequences: Vec<Vec<u32>>,
        vocab_size: usize,
        max_len: usize,
        pad_idx: u32,
    ) -> Result<Self> {
        if sequences.is_empty() {
            return Err(SeqGanError::EmptyBatch {
                context: "dataset holds no sequences".into(),
            });
        }
        for (i, seq) in sequences.iter().enumerate() {
            if seq.is_empty() {
                return Err(SeqGanError::EmptyBatch {
                    context: format!("sequence {i} is empty"),
                });
            }
            if seq.len() > max_len {
                return Err(SeqGanError::ShapeMismatch {
                    name: format!("sequence {i}"),
                    expected: max_len,
                    actual: seq.len(),
                });
            }
            for &token in seq {
                if token as usize >= vocab_size {
                    return Err(SeqGanError::TokenOutOfRange {
                        index: i,
                        token,
                        vocab_size,
                    });
                }
            }
        }
        Ok(Self {
            sequences,
            max_len,
            pad_idx,
        })
    }

    /// Load a dataset from a JSON file containing `[[u32, ...], ...]`.
    pub fn from_json_file(
        path: impl AsRef<Path>,
        vocab_size: usize,
        max_len: usize,
        pad_idx: u32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeqGanError::io(format!("reading dataset {}", path.display()), e))?;
        let sequences: Vec<Vec<u32>> =
            serde_json::from_str(&content).map_err(|e| SeqGanError::Serialization {
                message: format!("dataset {}: {e}", path.display()),
            })?;
        Self::from_sequences(sequences, vocab_size, max_len, pad_idx)
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// True when the dataset holds no sequences (constructors forbid this).
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// Shuffling batcher over a [`SequenceDataset`].
pub struct DataLoader {
    dataset: SequenceDataset,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl DataLoader {
    /// Create a loader. `shuffle` should be on for training splits only.
    pub fn new(dataset: SequenceDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            dataset,
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of batches per epoch (the trailing partial batch counts).
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Materialize one epoch of padded batches.
    pub fn batches(&mut self) -> Vec<SequenceBatch> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }

        indices
            .chunks(self.batch_size)
            .map(|chunk| {
                let rows: Vec<Vec<u32>> = chunk
                    .iter()
                    .map(|&i| self.dataset.sequences[i].clone())
                    .collect();
                SequenceBatch::from_sequences(&rows, self.dataset.max_len, self.dataset.pad_idx)
                    .expect("dataset rows validated at load")
            })
            .collect()
    }
}

/// Resolve `<data_dir>/<kind>_<split>.json` into a loader, mirroring the
/// `get_dataloader(kind, split, batch_size)` boundary of the training
/// pipelines. `kind` is typically `"gen"`; `split` is `"train"` or
/// `"valid"` (shuffling is enabled for `"train"` only).
pub fn get_dataloader(
    data_dir: impl AsRef<Path>,
    kind: &str,
    split: &str,
    batch_size: usize,
    config: &TrainConfig,
) -> Result<DataLoader> {
    let path = data_dir.as_ref().join(format!("{kind}_{split}.json"));
    let dataset = SequenceDataset::from_json_file(
        &path,
        config.vocab_size,
        config.max_len,
        config.pad_idx,
    )?;
    Ok(DataLoader::new(
        dataset,
        batch_size,
        split == "train",
        config.seed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_dataset() -> SequenceDataset {
        SequenceDataset::from_sequences(
            vec![vec![1, 2, 3], vec![2, 3], vec![4], vec![1, 4, 3, 2]],
            5,
            4,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_batch_padding() {
        let batch = SequenceBatch::from_sequences(&[vec![1, 2], vec![3]], 4, 0).unwrap();
        assert_eq!(batch.row(0), &[1, 2, 0, 0]);
        assert_eq!(batch.row(1), &[3, 0, 0, 0]);
    }

    #[test]
    fn test_batch_column() {
        let batch = SequenceBatch::new(vec![1, 2, 3, 4, 5, 6], 2, 3).unwrap();
        assert_eq!(batch.column(0), vec![1, 4]);
        assert_eq!(batch.column(2), vec![3, 6]);
    }

    #[test]
    fn test_batch_prefix() {
        let batch = SequenceBatch::new(vec![1, 2, 3, 4, 5, 6], 2, 3).unwrap();
        let prefix = batch.prefix(2);
        assert_eq!(prefix.seq_len, 2);
        assert_eq!(prefix.row(0), &[1, 2]);
        assert_eq!(prefix.row(1), &[4, 5]);
    }

    #[test]
    fn test_batch_repeat_rows_blocks() {
        let batch = SequenceBatch::new(vec![1, 2, 3, 4], 2, 2).unwrap();
        let repeated = batch.repeat_rows(3);
        assert_eq!(repeated.batch_size, 6);
        for n in 0..3 {
            assert_eq!(repeated.row(n), &[1, 2]);
            assert_eq!(repeated.row(3 + n), &[3, 4]);
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = SequenceBatch::from_sequences(&[], 4, 0).unwrap_err();
        assert!(matches!(err, SeqGanError::EmptyBatch { .. }));
    }

    #[test]
    fn test_dataset_rejects_out_of_vocab() {
        let err = SequenceDataset::from_sequences(vec![vec![1, 9]], 5, 4, 0).unwrap_err();
        assert!(matches!(
            err,
            SeqGanError::TokenOutOfRange { token: 9, .. }
        ));
    }

    #[test]
    fn test_dataset_rejects_overlong_sequence() {
        let err = SequenceDataset::from_sequences(vec![vec![1, 2, 3, 4, 1]], 5, 4, 0).unwrap_err();
        assert!(matches!(err, SeqGanError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_loader_covers_dataset() {
        let mut loader = DataLoader::new(small_dataset(), 3, false, 7);
        let batches = loader.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_size, 3);
        assert_eq!(batches[1].batch_size, 1);
        assert!(batches.iter().all(|b| b.seq_len == 4));
    }

    #[test]
    fn test_loader_shuffle_is_seeded() {
        let mut a = DataLoader::new(small_dataset(), 2, true, 11);
        let mut b = DataLoader::new(small_dataset(), 2, true, 11);
        assert_eq!(a.batches(), b.batches());
    }

    #[test]
    fn test_check_vocab() {
        let batch = SequenceBatch::new(vec![1, 2, 3, 4], 2, 2).unwrap();
        assert!(batch.check_vocab(5).is_ok());
        assert!(batch.check_vocab(4).is_err());
    }

    proptest! {
        #[test]
        fn test_batches_always_uniform_shape(
            lens in prop::collection::vec(1usize..=6, 1..20),
            batch_size in 1usize..5,
        ) {
            let sequences: Vec<Vec<u32>> =
                lens.iter().map(|&l| vec![1u32; l]).collect();
            let dataset =
                SequenceDataset::from_sequences(sequences, 5, 6, 0).unwrap();
            let mut loader = DataLoader::new(dataset, batch_size, true, 3);
            for batch in loader.batches() {
                prop_assert_eq!(batch.seq_len, 6);
                prop_assert_eq!(batch.tokens.len(), batch.batch_size * 6);
            }
        }
    }
}
