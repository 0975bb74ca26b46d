use point_cloud_pre_processing::GridError;

/// Errors raised while comparing cell tables or chunking a comparison.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("comparison needs at least two files, got {count}")]
    TooFewFiles { count: usize },

    #[error("exactly two distinct group names are required, found {found:?}")]
    GroupCount { found: Vec<String> },

    #[error("chunk size must be at least 1, got {size}")]
    InvalidChunkSize { size: usize },

    #[error("chunk size {chunk_size} exceeds the number of comparison cells ({cells})")]
    ChunkSizeExceedsCells { chunk_size: usize, cells: usize },

    #[error("cell table could not be read: {0}")]
    Table(#[from] GridError),

    #[error("comparison result is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ComparisonError {
    /// True for requests that can never succeed as posed.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            ComparisonError::TooFewFiles { .. }
                | ComparisonError::GroupCount { .. }
                | ComparisonError::InvalidChunkSize { .. }
                | ComparisonError::ChunkSizeExceedsCells { .. }
        )
    }
}

pub type CompareResult<T> = Result<T, ComparisonError>;
