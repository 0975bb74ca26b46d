//! Job worker for grid preprocessing, grid comparison and comparison chunking.
//!
//! Collaborators (object store, chunk cache, result publisher) are passed in
//! explicitly so each can be swapped out in tests.

pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod jobs;
pub mod publisher;
pub mod storage;
pub mod worker;

pub use cache::{ChunkCache, MokaChunkCache};
pub use config::{ConfigError, WorkerConfig};
pub use envelope::{JobEnvelope, JobStatus, StorageRef};
pub use error::{JobError, JobResult, StorageError};
pub use publisher::{JsonLinesPublisher, ResultPublisher};
pub use storage::{LocalObjectStore, ObjectStore};
pub use worker::Worker;
