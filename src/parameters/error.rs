use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for tensor construction.
pub type Result<T> = std::result::Result<T, ShapeErr>;

/// Error returned when a tensor's values don't fill it's declared shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeErr {
    pub shape: Vec<usize>,
    pub len: usize,
}

impl Display for ShapeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor error: shape {:?} holds {} values, got {}",
            self.shape,
            self.shape.iter().product::<usize>(),
            self.len
        )
    }
}

impl Error for ShapeErr {}
