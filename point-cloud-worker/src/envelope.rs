/// Job and result messages.
use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use constants::processing::INDIVIDUAL_PERCENTILE_RANGE;
use point_cloud_comparison::{ChunkedCells, ComparisonStatistics, GroupMapping};
use point_cloud_pre_processing::bounds::validate_bboxes;
use point_cloud_pre_processing::{BoundingBox, FilterConfig, Grid, GridSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PREPROCESSING_TYPE: &str = "preprocessing";
pub const COMPARISON_TYPE: &str = "comparison";
pub const CHUNKING_TYPE: &str = "chunking";
pub const CHUNKING_RESULT_TYPE: &str = "chunking_comparison_result";
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Success,
    Error,
}

/// Shared `{type, job_id, status, payload, timestamp}` wrapper of every message.
///
/// Payload field names follow the backend's camelCase wire format, except the
/// chunked comparison fields which keep their snake_case names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl JobEnvelope {
    /// New job request, used by producers and tests
    pub fn request(kind: &str, job_id: impl Into<String>, payload: impl Serialize) -> JobResult<Self> {
        Self::with_status(kind, job_id, JobStatus::Pending, payload)
    }

    pub fn success(kind: &str, job_id: impl Into<String>, payload: impl Serialize) -> JobResult<Self> {
        Self::with_status(kind, job_id, JobStatus::Success, payload)
    }

    /// Error result; never fails since the payload is built here
    pub fn error(kind: &str, job_id: impl Into<String>, payload: ErrorPayload) -> Self {
        let payload = serde_json::to_value(&payload)
            .unwrap_or_else(|_| serde_json::json!({ "msg": payload.msg }));
        Self {
            kind: kind.to_string(),
            job_id: job_id.into(),
            status: JobStatus::Error,
            payload,
            timestamp: Utc::now(),
        }
    }

    fn with_status(
        kind: &str,
        job_id: impl Into<String>,
        status: JobStatus,
        payload: impl Serialize,
    ) -> JobResult<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| JobError::Unexpected(format!("result could not be encoded: {}", e)))?;
        Ok(Self {
            kind: kind.to_string(),
            job_id: job_id.into(),
            status,
            payload,
            timestamp: Utc::now(),
        })
    }

    /// Decode the payload as a typed job request
    pub fn payload_as<T: DeserializeOwned>(&self) -> JobResult<T> {
        T::deserialize(&self.payload)
            .map_err(|e| JobError::invalid(format!("{} job request is invalid: {}", self.kind, e)))
    }
}

/// Reference to an object in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRef {
    pub bucket: String,
    pub object_key: String,
}

impl StorageRef {
    fn validate(&self, field: &str) -> JobResult<()> {
        if self.bucket.is_empty() || self.object_key.is_empty() {
            return Err(JobError::invalid(format!(
                "{} needs a bucket and an objectKey",
                field
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_id: Option<u64>,
}

impl ErrorPayload {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            comparison_id: None,
        }
    }

    pub fn for_comparison(msg: impl Into<String>, comparison_id: Option<u64>) -> Self {
        Self {
            msg: msg.into(),
            comparison_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreprocessingPayload {
    pub job_id: String,
    pub file: StorageRef,
    pub grid: Grid,
    pub bboxes: Vec<BoundingBox>,
    #[serde(default)]
    pub comparison_id: Option<u64>,
    #[serde(default)]
    pub file_id: Option<u64>,
    #[serde(default)]
    pub point_filter_lower_bound: Option<f64>,
    #[serde(default)]
    pub point_filter_upper_bound: Option<f64>,
    #[serde(default)]
    pub point_filter_enabled: Option<bool>,
    #[serde(default)]
    pub outlier_detection_enabled: Option<bool>,
    #[serde(default)]
    pub outlier_deviation_factor: Option<f64>,
    #[serde(default)]
    pub individual_percentile: Option<f64>,
}

impl PreprocessingPayload {
    /// Filter settings with unset fields at their defaults
    pub fn filter(&self) -> FilterConfig {
        let defaults = FilterConfig::default();
        FilterConfig {
            lower_percentile: self
                .point_filter_lower_bound
                .unwrap_or(defaults.lower_percentile),
            upper_percentile: self
                .point_filter_upper_bound
                .unwrap_or(defaults.upper_percentile),
            percentile_filter_enabled: self
                .point_filter_enabled
                .unwrap_or(defaults.percentile_filter_enabled),
            outlier_detection_enabled: self
                .outlier_detection_enabled
                .unwrap_or(defaults.outlier_detection_enabled),
            outlier_deviation_factor: self
                .outlier_deviation_factor
                .unwrap_or(defaults.outlier_deviation_factor),
            individual_percentile: self.individual_percentile,
        }
    }

    pub fn validate(&self) -> JobResult<()> {
        if self.job_id.trim().is_empty() {
            return Err(JobError::invalid("jobId must not be empty"));
        }
        self.file.validate("file")?;
        if self.bboxes.is_empty() {
            return Err(JobError::invalid("at least one bounding box is required"));
        }
        if self.comparison_id == Some(0) || self.file_id == Some(0) {
            return Err(JobError::invalid("comparisonId and fileId start at 1"));
        }
        if let Some(p) = self.individual_percentile {
            let (low, high) = INDIVIDUAL_PERCENTILE_RANGE;
            if !(low..=high).contains(&p) {
                return Err(JobError::invalid(format!(
                    "individualPercentile must be within {}..={}",
                    low, high
                )));
            }
        }
        self.grid.validate()?;
        validate_bboxes(&self.bboxes)?;
        self.filter().validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessingResultPayload {
    pub result: StorageRef,
    pub summary: GridSummary,
    pub comparison_id: Option<u64>,
    pub file_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonFile {
    pub bucket: String,
    pub object_key: String,
    pub group_name: String,
}

impl ComparisonFile {
    pub fn storage_ref(&self) -> StorageRef {
        StorageRef {
            bucket: self.bucket.clone(),
            object_key: self.object_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPayload {
    #[serde(default)]
    pub job_id: String,
    pub comparison_id: u64,
    pub files: Vec<ComparisonFile>,
}

impl ComparisonPayload {
    pub fn validate(&self) -> JobResult<()> {
        for (i, file) in self.files.iter().enumerate() {
            file.storage_ref().validate(&format!("files[{}]", i))?;
            if file.group_name.is_empty() {
                return Err(JobError::invalid(format!("files[{}] has no groupName", i)));
            }
        }
        if self.files.len() < 2 {
            return Err(JobError::constraint(format!(
                "comparison needs at least two files, got {}",
                self.files.len()
            )));
        }
        let mut groups: Vec<&str> = self.files.iter().map(|f| f.group_name.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        if groups.len() != 2 {
            return Err(JobError::constraint(format!(
                "exactly two distinct groupNames are required, found {:?}",
                groups
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResultPayload {
    pub comparison_id: u64,
    pub result: StorageRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingPayload {
    pub comparison_id: u64,
    pub chunking_size: usize,
    pub file: StorageRef,
}

impl ChunkingPayload {
    pub fn validate(&self) -> JobResult<()> {
        self.file.validate("file")?;
        if self.chunking_size < 1 {
            return Err(JobError::constraint("chunkingSize must be at least 1"));
        }
        Ok(())
    }
}

/// Full chunked comparison, sent inline when the cache cannot take it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkedComparison {
    #[serde(rename = "comparisonId")]
    pub comparison_id: u64,
    #[serde(rename = "chunkingSize")]
    pub chunking_size: usize,
    pub chunked_cells: ChunkedCells,
    pub statistics: ComparisonStatistics,
    pub group_mapping: GroupMapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics_p: Option<ComparisonStatistics>,
}

/// Notification that a chunked comparison is waiting in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChunkNotice {
    pub comparison_id: u64,
    pub chunk_size: usize,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChunkingOutcome {
    Cached(CachedChunkNotice),
    Inline(Box<ChunkedComparison>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn preprocessing_json() -> Value {
        json!({
            "jobId": "17",
            "file": {"bucket": "basebucket", "objectKey": "scan.laz"},
            "grid": {"xMin": 0, "xMax": 10, "yMin": 0, "yMax": 10, "cellWidth": 1, "cellHeight": 1},
            "bboxes": [{"xMin": 0, "xMax": 5, "yMin": 0, "yMax": 5}],
            "comparisonId": 3,
            "fileId": 9,
            "pointFilterUpperBound": 90
        })
    }

    #[test]
    fn preprocessing_payload_fills_filter_defaults() {
        let payload: PreprocessingPayload = serde_json::from_value(preprocessing_json()).unwrap();
        payload.validate().unwrap();
        let filter = payload.filter();
        assert_eq!(filter.lower_percentile, 0.0);
        assert_eq!(filter.upper_percentile, 90.0);
        assert!(filter.percentile_filter_enabled);
        assert_eq!(filter.outlier_deviation_factor, 2.0);
    }

    #[test]
    fn unknown_fields_and_bad_grids_are_invalid() {
        let mut extra = preprocessing_json();
        extra["colour"] = json!("green");
        let envelope = JobEnvelope::request(PREPROCESSING_TYPE, "17", &extra).unwrap();
        assert!(matches!(
            envelope.payload_as::<PreprocessingPayload>(),
            Err(JobError::RequestInvalid(_))
        ));

        let mut bad_grid = preprocessing_json();
        bad_grid["grid"]["cellWidth"] = json!(0);
        let payload: PreprocessingPayload = serde_json::from_value(bad_grid).unwrap();
        assert!(matches!(payload.validate(), Err(JobError::RequestInvalid(_))));

        let mut no_boxes = preprocessing_json();
        no_boxes["bboxes"] = json!([]);
        let payload: PreprocessingPayload = serde_json::from_value(no_boxes).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn comparison_payload_needs_two_groups() {
        let payload: ComparisonPayload = serde_json::from_value(json!({
            "jobId": "c1",
            "comparisonId": 4,
            "files": [
                {"bucket": "b", "objectKey": "one.csv", "groupName": "2020"},
                {"bucket": "b", "objectKey": "two.csv", "groupName": "2020"}
            ]
        }))
        .unwrap();
        assert!(matches!(payload.validate(), Err(JobError::ConstraintViolation(_))));
    }

    #[test]
    fn envelope_wire_format() {
        let envelope = JobEnvelope::error(
            COMPARISON_TYPE,
            "c1",
            ErrorPayload::for_comparison("no files", Some(4)),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "comparison");
        assert_eq!(value["status"], "error");
        assert_eq!(value["payload"]["msg"], "no files");
        assert_eq!(value["payload"]["comparisonId"], 4);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));

        let parsed: JobEnvelope =
            serde_json::from_str(r#"{"type":"chunking","payload":{}}"#).unwrap();
        assert_eq!(parsed.status, JobStatus::Pending);
        assert_eq!(parsed.job_id, "");
    }

    #[test]
    fn cached_notice_wire_names() {
        let notice = ChunkingOutcome::Cached(CachedChunkNotice {
            comparison_id: 4,
            chunk_size: 8,
            cached: true,
        });
        assert_eq!(
            serde_json::to_value(&notice).unwrap(),
            json!({"comparisonId": 4, "chunkSize": 8, "cached": true})
        );
    }
}
