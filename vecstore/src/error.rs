use thiserror::Error;

#[derive(Error, Debug)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: build failed: {0}")]
    Build(String),

    #[error("vecstore: persistence failed: {0}")]
    Persistence(String),

    #[error("vecstore: store error: {0}")]
    Store(String),

    #[error("vecstore: {0}")]
    Io(String),

    #[error("vecstore: invalid format: {0}")]
    InvalidFormat(String),
}

impl VecError {
    /// Reports whether the error was raised before any state was touched
    /// because the caller supplied a vector of the wrong length.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, VecError::DimensionMismatch { .. })
    }
}

impl From<redb::Error> for VecError {
    fn from(e: redb::Error) -> Self {
        VecError::Store(e.to_string())
    }
}
