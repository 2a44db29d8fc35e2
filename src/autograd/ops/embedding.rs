//! Token embedding lookup with scatter backward.
//!
//! Gathers rows of a `[vocab, embed_dim]` table for a slice of token ids,
//! producing `[batch, embed_dim]` flattened. Token ids are validated at
//! the model boundary; an out-of-range id reaching this op is a bug.

use crate::autograd::{grad_enabled, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Look up embedding rows for `ids`.
pub fn embedding(table: &Tensor, ids: &[u32], embed_dim: usize) -> Tensor {
    debug_assert_eq!(table.len() % embed_dim, 0);
    let vocab_size = table.len() / embed_dim;

    let mut out = Vec::with_capacity(ids.len() * embed_dim);
    {
        let table_data = table.data();
        let rows = table_data.as_slice().expect("contiguous");
        for &id in ids {
            let idx = id as usize;
            debug_assert!(idx < vocab_size, "token id {idx} out of vocabulary");
            out.extend_from_slice(&rows[idx * embed_dim..(idx + 1) * embed_dim]);
        }
    }

    let requires_grad = grad_enabled() && table.requires_grad();
    let result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(EmbeddingBackward {
            table: table.clone(),
            ids: ids.to_vec(),
            embed_dim,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct EmbeddingBackward {
    table: Tensor,
    ids: Vec<u32>,
    embed_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for EmbeddingBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.table.requires_grad() {
                // Scatter-add each row's gradient back into its table row.
                let gy = grad.as_slice().expect("contiguous");
                let mut gt = vec![0.0f32; self.table.len()];
                for (pos, &id) in self.ids.iter().enumerate() {
                    let src = &gy[pos * self.embed_dim..(pos + 1) * self.embed_dim];
                    let dst_start = id as usize * self.embed_dim;
                    for (i, &g) in src.iter().enumerate() {
                        gt[dst_start + i] += g;
                    }
                }
                self.table.accumulate_grad(Array1::from(gt));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.table.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use crate::autograd::ops::sum;

    #[test]
    fn test_embedding_gather() {
        // vocab 3, embed 2
        let table = Tensor::from_vec(vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1], false);
        let out = embedding(&table, &[2, 0], 2);
        assert_eq!(out.to_vec(), vec![2.0, 2.1, 0.0, 0.1]);
    }

    #[test]
    fn test_embedding_scatter_backward() {
        let table = Tensor::from_vec(vec![0.0; 6], true);
        // Row 1 appears twice: gradient must accumulate.
        let out = embedding(&table, &[1, 1, 2], 2);
        let loss = sum(&out);
        backward(&loss, None);

        let grad = table.grad().unwrap();
        assert_eq!(grad.to_vec(), vec![0.0, 0.0, 2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_embedding_no_grad_table() {
        let table = Tensor::from_vec(vec![0.0; 4], false);
        let out = embedding(&table, &[0, 1], 2);
        assert!(out.backward_op().is_none());
    }
}
