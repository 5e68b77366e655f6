use std::{ops::Index, slice};

use serde::{Deserialize, Serialize};

use super::Tensor;

/// The parameters of a whole model, an ordered sequence of tensors.
///
/// An empty `Weights` is what clients return to signal that they couldn't produce an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weights(Vec<Tensor>);

impl Weights {
    /// Creates a new `Weights`.
    ///
    /// # Arguments
    /// * `tensors` - The tensors of the model, in layer order.
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self(tensors)
    }

    /// The amount of tensors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The total amount of scalar parameters across all tensors.
    pub fn num_params(&self) -> usize {
        self.0.iter().map(Tensor::len).sum()
    }

    pub fn iter(&self) -> slice::Iter<'_, Tensor> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Tensor> {
        self.0.iter_mut()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.0
    }

    /// Checks that both weights hold the same amount of tensors with the same shapes.
    ///
    /// # Arguments
    /// * `other` - The weights to compare against.
    pub fn same_layout(&self, other: &Weights) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.shape() == b.shape())
    }
}

impl Index<usize> for Weights {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Weights {
    type Item = &'a Tensor;
    type IntoIter = slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
