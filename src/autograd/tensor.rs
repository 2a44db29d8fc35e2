//! Flat 1-D tensor with shared gradient storage.
//!
//! A `Tensor` is a cheaply clonable handle (`Rc`) to flat `Array1<f32>`
//! storage plus an optional gradient cell. Shapes are carried by the ops
//! that consume a tensor, not by the tensor itself; a `[batch, dim]`
//! matrix is stored row-major in one flat array.

use ndarray::Array1;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::backward::BackwardOp;

struct TensorInner {
    data: RefCell<Array1<f32>>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: bool,
    backward_op: RefCell<Option<Rc<dyn BackwardOp>>>,
}

/// Handle to tensor storage. Clones share data and gradient.
#[derive(Clone)]
pub struct Tensor {
    inner: Rc<TensorInner>,
}

impl Tensor {
    /// Create a tensor from an ndarray.
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            inner: Rc::new(TensorInner {
                data: RefCell::new(data),
                grad: Rc::new(RefCell::new(None)),
                requires_grad,
                backward_op: RefCell::new(None),
            }),
        }
    }

    /// Create a tensor from a plain vector.
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor.
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    /// True when the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the underlying data.
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        self.inner.data.borrow()
    }

    /// Mutably borrow the underlying data (optimizer updates).
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        self.inner.data.borrow_mut()
    }

    /// Copy the data out as a plain vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.inner.data.borrow().to_vec()
    }

    /// Whether gradients are tracked for this tensor.
    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    /// Clone of the current gradient, if any.
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.inner.grad.borrow().clone()
    }

    /// The shared gradient cell. Backward ops hold this to read the
    /// upstream gradient of their result.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.inner.grad)
    }

    /// Replace the gradient.
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.inner.grad.borrow_mut() = Some(grad);
    }

    /// Add into the gradient, initializing it if absent.
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut cell = self.inner.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing = &*existing + &grad,
            None => *cell = Some(grad),
        }
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) {
        *self.inner.grad.borrow_mut() = None;
    }

    /// The op that produced this tensor, if it was produced by one.
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.inner.backward_op.borrow().clone()
    }

    /// Attach the producing op (called by ops on their result).
    pub fn set_backward_op(&self, op: Rc<dyn BackwardOp>) {
        *self.inner.backward_op.borrow_mut() = Some(op);
    }

    /// A copy of the data detached from the graph.
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.inner.data.borrow().clone(), false)
    }

    /// Identity of the underlying storage, used to deduplicate graph
    /// nodes during the backward traversal.
    pub fn node_id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("len", &self.len())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        assert_eq!(t.len(), 3);
        assert!(t.requires_grad());
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(5, false);
        assert_eq!(t.len(), 5);
        assert!(t.data().iter().all(|&x| x == 0.0));
        assert!(!t.requires_grad());
    }

    #[test]
    fn test_clone_shares_storage() {
        let t = Tensor::from_vec(vec![1.0, 2.0], true);
        let u = t.clone();
        t.data_mut()[0] = 5.0;
        assert_eq!(u.data()[0], 5.0);
        assert_eq!(t.node_id(), u.node_id());
    }

    #[test]
    fn test_accumulate_grad() {
        let t = Tensor::from_vec(vec![1.0, 2.0], true);
        t.accumulate_grad(arr1(&[0.5, 0.5]));
        t.accumulate_grad(arr1(&[1.0, 2.0]));
        let grad = t.grad().unwrap();
        assert_eq!(grad[0], 1.5);
        assert_eq!(grad[1], 2.5);
    }

    #[test]
    fn test_zero_grad() {
        let t = Tensor::from_vec(vec![1.0], true);
        t.set_grad(arr1(&[3.0]));
        assert!(t.grad().is_some());
        t.zero_grad();
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_detach() {
        let t = Tensor::from_vec(vec![1.0, 2.0], true);
        let d = t.detach();
        assert!(!d.requires_grad());
        assert_ne!(t.node_id(), d.node_id());
        // Detached copy does not alias the original.
        d.data_mut()[0] = 9.0;
        assert_eq!(t.data()[0], 1.0);
    }
}
