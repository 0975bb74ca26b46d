/// Job dispatch.
use crate::cache::ChunkCache;
use crate::config::WorkerConfig;
use crate::envelope::{
    CHUNKING_RESULT_TYPE, CHUNKING_TYPE, COMPARISON_TYPE, ChunkingPayload, ComparisonPayload,
    ErrorPayload, JobEnvelope, PREPROCESSING_TYPE, PreprocessingPayload, UNKNOWN_TYPE,
};
use crate::error::{JobError, JobResult};
use crate::jobs;
use crate::publisher::ResultPublisher;
use crate::storage::ObjectStore;
use point_cloud_comparison::ComparisonEngine;
use point_cloud_pre_processing::PreprocessingPipeline;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns any job envelope into exactly one published result envelope.
///
/// Failures never escape as errors; they become `status = "error"` results
/// on the same channel.
pub struct Worker {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn ChunkCache>,
    publisher: Arc<dyn ResultPublisher>,
    pipeline: PreprocessingPipeline,
    engine: ComparisonEngine,
}

impl Worker {
    /// Create new worker around its collaborators
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn ChunkCache>,
        publisher: Arc<dyn ResultPublisher>,
    ) -> Self {
        let pipeline = PreprocessingPipeline::new(config.processing.point_chunk_size);
        Self {
            config,
            store,
            cache,
            publisher,
            pipeline,
            engine: ComparisonEngine::new(),
        }
    }

    /// Hide progress bars, e.g. when output is captured
    pub fn without_progress(mut self) -> Self {
        self.pipeline = self.pipeline.without_progress();
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one job and publish its result
    pub fn handle(&self, envelope: JobEnvelope) -> JobEnvelope {
        info!(kind = %envelope.kind, job_id = %envelope.job_id, "Received job");
        let result = match envelope.kind.as_str() {
            PREPROCESSING_TYPE => self.handle_preprocessing(&envelope),
            COMPARISON_TYPE => self.handle_comparison(&envelope),
            CHUNKING_TYPE => self.handle_chunking(&envelope),
            other => {
                let err = JobError::invalid(format!("unknown job type '{}'", other));
                report(&err, &envelope.job_id);
                JobEnvelope::error(UNKNOWN_TYPE, envelope.job_id.clone(), ErrorPayload::new(err.to_string()))
            }
        };
        self.publish(&result);
        result
    }

    /// Publish an error for a line that is not a job envelope at all
    pub fn reject_malformed(&self, reason: &serde_json::Error) -> JobEnvelope {
        let err = JobError::invalid(format!("job envelope is malformed: {}", reason));
        report(&err, "");
        let result = JobEnvelope::error(UNKNOWN_TYPE, "", ErrorPayload::new(err.to_string()));
        self.publish(&result);
        result
    }

    pub fn handle_preprocessing(&self, envelope: &JobEnvelope) -> JobEnvelope {
        let outcome = envelope
            .payload_as::<PreprocessingPayload>()
            .and_then(|payload| {
                let result = jobs::preprocess::run(self.store.as_ref(), &self.pipeline, &payload)?;
                Ok((payload.job_id, result))
            })
            .and_then(|(job_id, result)| JobEnvelope::success(PREPROCESSING_TYPE, job_id, result));
        outcome.unwrap_or_else(|err| {
            report(&err, &envelope.job_id);
            JobEnvelope::error(PREPROCESSING_TYPE, envelope.job_id.clone(), ErrorPayload::new(err.to_string()))
        })
    }

    pub fn handle_comparison(&self, envelope: &JobEnvelope) -> JobEnvelope {
        let payload = envelope.payload_as::<ComparisonPayload>();
        let comparison_id = payload.as_ref().ok().map(|p| p.comparison_id);
        let outcome: JobResult<JobEnvelope> = payload.and_then(|payload| {
            let result = jobs::compare::run(self.store.as_ref(), &self.engine, &payload)?;
            JobEnvelope::success(COMPARISON_TYPE, envelope.job_id.clone(), result)
        });
        outcome.unwrap_or_else(|err| {
            report(&err, &envelope.job_id);
            JobEnvelope::error(
                COMPARISON_TYPE,
                envelope.job_id.clone(),
                ErrorPayload::for_comparison(err.to_string(), comparison_id),
            )
        })
    }

    pub fn handle_chunking(&self, envelope: &JobEnvelope) -> JobEnvelope {
        let outcome = envelope
            .payload_as::<ChunkingPayload>()
            .and_then(|payload| jobs::chunking::run(self.store.as_ref(), self.cache.as_ref(), &payload))
            .and_then(|result| JobEnvelope::success(CHUNKING_RESULT_TYPE, envelope.job_id.clone(), result));
        outcome.unwrap_or_else(|err| {
            report(&err, &envelope.job_id);
            JobEnvelope::error(CHUNKING_RESULT_TYPE, envelope.job_id.clone(), ErrorPayload::new(err.to_string()))
        })
    }

    fn publish(&self, envelope: &JobEnvelope) {
        if let Err(e) = self.publisher.publish(envelope) {
            error!(kind = %envelope.kind, job_id = %envelope.job_id, error = %e, "Failed to publish result");
        }
    }
}

fn report(err: &JobError, job_id: &str) {
    match err {
        JobError::Unexpected(_) => error!(job_id, class = err.class(), error = %err, "Job failed"),
        _ => warn!(job_id, class = err.class(), error = %err, "Job cancelled"),
    }
}
