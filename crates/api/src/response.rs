//! 对外响应DTO
//!
//! 任务快照只暴露轮询方需要的字段，Worker侧的内部状态
//! （心跳时间等）不出现在线上。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use automl_domain::entities::{Job, JobError, JobKind, JobResult, JobStatus};
use automl_ml::artifacts::ArtifactMeta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    /// false 表示任务已终止，取消来得太晚
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobSnapshot {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            message: job.message,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListResponse {
    pub artifacts: Vec<ArtifactMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_job_hides_worker_internals() {
        let mut job = Job::new(JobKind::Train);
        job.worker_id = Some("worker-1".to_string());
        job.last_heartbeat = Some(Utc::now());

        let snapshot = JobSnapshot::from(job.clone());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["id"], job.id);
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["progress"], 0);
        assert!(json.get("worker_id").is_none());
        assert!(json.get("last_heartbeat").is_none());
    }

    #[test]
    fn test_optional_fields_are_omitted_until_set() {
        let job = Job::new(JobKind::Predict);
        let json = serde_json::to_value(JobSnapshot::from(job)).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("started_at").is_none());
        assert!(json.get("finished_at").is_none());
    }

    #[test]
    fn test_cancel_response_shape() {
        let json = serde_json::to_string(&CancelJobResponse { ok: false }).unwrap();
        assert_eq!(json, r#"{"ok":false}"#);
    }
}
