/// Errors raised while binning a point cloud into a grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("invalid grid: {reason}")]
    InvalidGrid { reason: String },

    #[error("invalid bounding box #{index}: {reason}")]
    InvalidBoundingBox { index: usize, reason: String },

    #[error("invalid filter configuration: {reason}")]
    InvalidFilter { reason: String },

    #[error("point chunk is malformed: {reason}")]
    MalformedChunk { reason: String },

    #[error("vegetation height dimension '{name}' could not be decoded: {reason}")]
    Dimension { name: String, reason: String },

    #[error("cell table is malformed: {reason}")]
    MalformedTable { reason: String },

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridError {
    /// True for errors describing a bad request rather than a failed read.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GridError::InvalidGrid { .. }
                | GridError::InvalidBoundingBox { .. }
                | GridError::InvalidFilter { .. }
        )
    }
}

pub type GridResult<T> = Result<T, GridError>;
