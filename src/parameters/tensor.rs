use serde::{Deserialize, Serialize};

use super::{Result, ShapeErr};

/// A dense, row-major block of model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = ShapeErr;

    fn try_from(raw: RawTensor) -> Result<Self> {
        Tensor::new(raw.shape, raw.values)
    }
}

impl Tensor {
    /// Creates a new `Tensor`.
    ///
    /// # Arguments
    /// * `shape` - The dimensions of the tensor.
    /// * `values` - The flattened values, in row-major order.
    ///
    /// # Returns
    /// A new `Tensor` or a `ShapeErr` if `values` doesn't fill `shape` exactly.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        if shape.iter().product::<usize>() != values.len() {
            return Err(ShapeErr {
                shape,
                len: values.len(),
            });
        }

        Ok(Self { shape, values })
    }

    /// Creates a new one dimensional `Tensor`.
    ///
    /// # Arguments
    /// * `values` - The values of the tensor.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Creates a `Tensor` of the given shape filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![0.; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_values_not_filling_shape() {
        let err = Tensor::new(vec![2, 3], vec![0.; 5]).unwrap_err();
        assert_eq!(err.len, 5);
        assert_eq!(err.shape, vec![2, 3]);
    }

    #[test]
    fn zeros_fills_shape() {
        let t = Tensor::zeros(vec![2, 2]);
        assert_eq!(t.values(), &[0.; 4]);
        assert_eq!(t.shape(), &[2, 2]);
    }

    #[test]
    fn deserialize_validates_shape() {
        let ok: Tensor = serde_json::from_str(r#"{"shape":[2],"values":[1.0,2.0]}"#).unwrap();
        assert_eq!(ok.values(), &[1.0, 2.0]);

        let bad = serde_json::from_str::<Tensor>(r#"{"shape":[3],"values":[1.0,2.0]}"#);
        assert!(bad.is_err());
    }
}
