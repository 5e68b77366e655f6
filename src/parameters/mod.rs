mod error;
mod tensor;
mod weights;

pub use error::{Result, ShapeErr};
pub use tensor::Tensor;
pub use weights::Weights;
