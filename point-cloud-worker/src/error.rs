use point_cloud_comparison::ComparisonError;
use point_cloud_pre_processing::GridError;

/// Failure classes reported back on the result channel.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Missing or malformed fields; the job is rejected before any heavy work
    #[error("{0}")]
    RequestInvalid(String),

    /// A referenced file could not be fetched or stored
    #[error("{0}")]
    ResourceUnavailable(String),

    /// The request is well formed but can never be satisfied
    #[error("{0}")]
    ConstraintViolation(String),

    #[error("{0}")]
    Unexpected(String),
}

impl JobError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        JobError::RequestInvalid(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        JobError::ConstraintViolation(msg.into())
    }

    /// Short class name used in logs
    pub fn class(&self) -> &'static str {
        match self {
            JobError::RequestInvalid(_) => "request_invalid",
            JobError::ResourceUnavailable(_) => "resource_unavailable",
            JobError::ConstraintViolation(_) => "constraint_violation",
            JobError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<GridError> for JobError {
    fn from(err: GridError) -> Self {
        if err.is_validation() {
            JobError::RequestInvalid(err.to_string())
        } else {
            JobError::Unexpected(err.to_string())
        }
    }
}

impl From<ComparisonError> for JobError {
    fn from(err: ComparisonError) -> Self {
        match err {
            e if e.is_constraint_violation() => JobError::ConstraintViolation(e.to_string()),
            // A stored comparison result that does not parse
            e @ ComparisonError::Json(_) => JobError::RequestInvalid(e.to_string()),
            e => JobError::Unexpected(e.to_string()),
        }
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        match err {
            e @ StorageError::InvalidKey { .. } => JobError::RequestInvalid(e.to_string()),
            e => JobError::ResourceUnavailable(e.to_string()),
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Unexpected(err.to_string())
    }
}

pub type JobResult<T> = Result<T, JobError>;

/// Object store and cache failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    #[error("object key '{key}' is not allowed")]
    InvalidKey { key: String },

    #[error("cache unavailable: {reason}")]
    Cache { reason: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
