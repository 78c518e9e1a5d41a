//! 内存任务存储
//!
//! 任务状态机的唯一权威。所有转换在同一把写锁内完成，
//! 等价于比较并交换: 先到的写入者赢得竞态，后到者得到冲突错误。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use automl_domain::cancellation::CancellationFlag;
use automl_domain::entities::{CancelOutcome, Job, JobError, JobResult, JobStatus};
use automl_domain::ports::JobRepository;
use automl_errors::{AutoMlError, AutoMlResult};

struct JobEntry {
    job: Job,
    flag: CancellationFlag,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    entries: tokio::sync::RwLock<HashMap<String, JobEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobStore {
    async fn create(&self, job: &Job) -> AutoMlResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&job.id) {
            return Err(AutoMlError::conflict(format!("任务ID已存在: {}", job.id)));
        }
        entries.insert(
            job.id.clone(),
            JobEntry {
                job: job.clone(),
                flag: CancellationFlag::new(),
            },
        );
        debug!("登记任务 {} (kind: {})", job.id, job.kind);
        Ok(())
    }

    async fn get(&self, id: &str) -> AutoMlResult<Job> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .map(|e| e.job.clone())
            .ok_or_else(|| AutoMlError::job_not_found(id))
    }

    async fn claim(&self, id: &str, worker_id: &str) -> AutoMlResult<Job> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        if entry.job.status != JobStatus::Pending {
            return Err(AutoMlError::invalid_transition(
                id,
                entry.job.status.as_str(),
                JobStatus::Running.as_str(),
            ));
        }
        let now = Utc::now();
        entry.job.status = JobStatus::Running;
        entry.job.worker_id = Some(worker_id.to_string());
        entry.job.started_at = Some(now);
        entry.job.last_heartbeat = Some(now);
        entry.job.message = "任务开始执行".to_string();
        debug!("Worker {} 认领任务 {}", worker_id, id);
        Ok(entry.job.clone())
    }

    async fn update_progress(&self, id: &str, percent: u8, message: &str) -> AutoMlResult<()> {
        if percent > 100 {
            return Err(AutoMlError::validation(format!(
                "进度百分比越界: {percent}"
            )));
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        if entry.job.status != JobStatus::Running {
            return Err(AutoMlError::conflict(format!(
                "任务 {} 处于 {} 状态，无法更新进度",
                id, entry.job.status
            )));
        }
        if percent < entry.job.progress {
            return Err(AutoMlError::conflict(format!(
                "进度必须单调不减: 当前 {}, 提交 {}",
                entry.job.progress, percent
            )));
        }
        entry.job.progress = percent;
        entry.job.message = message.to_string();
        entry.job.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    async fn heartbeat(&self, id: &str) -> AutoMlResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        if entry.job.status != JobStatus::Running {
            return Err(AutoMlError::conflict(format!(
                "任务 {} 处于 {} 状态，忽略心跳",
                id, entry.job.status
            )));
        }
        entry.job.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    async fn complete(&self, id: &str, result: JobResult) -> AutoMlResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        match entry.job.status {
            JobStatus::Running => {
                entry.job.status = JobStatus::Succeeded;
                entry.job.progress = 100;
                entry.job.message = "任务执行成功".to_string();
                entry.job.result = Some(result);
                entry.job.finished_at = Some(Utc::now());
                info!("任务 {} 执行成功", id);
                Ok(())
            }
            // 相同结果的重复提交按幂等处理，防止重复投递造成误报
            JobStatus::Succeeded if entry.job.result.as_ref() == Some(&result) => Ok(()),
            other => Err(AutoMlError::invalid_transition(
                id,
                other.as_str(),
                JobStatus::Succeeded.as_str(),
            )),
        }
    }

    async fn fail(&self, id: &str, error: JobError) -> AutoMlResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        if entry.job.status != JobStatus::Running {
            return Err(AutoMlError::invalid_transition(
                id,
                entry.job.status.as_str(),
                JobStatus::Failed.as_str(),
            ));
        }
        entry.job.status = JobStatus::Failed;
        entry.job.message = format!("任务执行失败: {}", error.message);
        entry.job.error = Some(error);
        entry.job.finished_at = Some(Utc::now());
        info!("任务 {} 执行失败", id);
        Ok(())
    }

    async fn cancel(&self, id: &str) -> AutoMlResult<CancelOutcome> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| AutoMlError::job_not_found(id))?;
        if entry.job.is_terminal() {
            // 已有结局不被追溯推翻
            return Ok(CancelOutcome::TooLate);
        }
        entry.job.status = JobStatus::Cancelled;
        entry.job.message = "任务已取消".to_string();
        entry.job.finished_at = Some(Utc::now());
        entry.flag.cancel();
        info!("任务 {} 已取消", id);
        Ok(CancelOutcome::Cancelled)
    }

    async fn cancellation_flag(&self, id: &str) -> AutoMlResult<CancellationFlag> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .map(|e| e.flag.clone())
            .ok_or_else(|| AutoMlError::job_not_found(id))
    }

    async fn find_running(&self) -> AutoMlResult<Vec<Job>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.job.is_running())
            .map(|e| e.job.clone())
            .collect())
    }

    async fn remove(&self, id: &str) -> AutoMlResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automl_domain::entities::{JobKind, PredictResult};

    fn predict_result() -> JobResult {
        JobResult::Predict(PredictResult {
            artifact_name: "m.json".to_string(),
            predictions: vec![serde_json::json!(1)],
            record_count: 1,
        })
    }

    async fn running_job(store: &InMemoryJobStore) -> Job {
        let job = Job::new(JobKind::Predict);
        store.create(&job).await.unwrap();
        store.claim(&job.id, "worker-1").await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::Train);
        store.create(&job).await.unwrap();

        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress, 0);

        assert!(matches!(
            store.get("missing").await,
            Err(AutoMlError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::Train);
        store.create(&job).await.unwrap();

        let claimed = store.claim(&job.id, "worker-1").await.unwrap();
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        // 第二次认领是冲突
        let err = store.claim(&job.id, "worker-2").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = InMemoryJobStore::new();
        let job = running_job(&store).await;

        store.update_progress(&job.id, 30, "拟合中").await.unwrap();
        store.update_progress(&job.id, 30, "仍在拟合").await.unwrap();
        store.update_progress(&job.id, 70, "评估中").await.unwrap();

        let err = store.update_progress(&job.id, 60, "回退").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get(&job.id).await.unwrap().progress, 70);

        assert!(store.update_progress(&job.id, 101, "越界").await.is_err());
    }

    #[tokio::test]
    async fn test_progress_on_terminal_job_is_conflict() {
        let store = InMemoryJobStore::new();
        let job = running_job(&store).await;
        store.complete(&job.id, predict_result()).await.unwrap();

        let err = store.update_progress(&job.id, 99, "迟到").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_complete_sets_progress_and_finished_at_once() {
        let store = InMemoryJobStore::new();
        let job = running_job(&store).await;
        store.complete(&job.id, predict_result()).await.unwrap();

        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        assert_eq!(snapshot.progress, 100);
        let finished_at = snapshot.finished_at.unwrap();

        // 相同结果重复提交是幂等的，finished_at不变
        store.complete(&job.id, predict_result()).await.unwrap();
        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.finished_at.unwrap(), finished_at);

        // 不同结果的重复提交是冲突
        let other = JobResult::Predict(PredictResult {
            artifact_name: "m.json".to_string(),
            predictions: vec![serde_json::json!(2)],
            record_count: 1,
        });
        let err = store.complete(&job.id, other).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_fail_requires_running() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::Train);
        store.create(&job).await.unwrap();

        let err = store.fail(&job.id, JobError::worker_lost()).await.unwrap_err();
        assert!(err.is_conflict());

        store.claim(&job.id, "worker-1").await.unwrap();
        store.fail(&job.id, JobError::worker_lost()).await.unwrap();
        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.unwrap().message, "worker lost");
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::Train);
        store.create(&job).await.unwrap();

        let outcome = store.cancel(&job.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert!(store.cancellation_flag(&job.id).await.unwrap().is_cancelled());

        // 取消后无法认领
        let err = store.claim(&job.id, "worker-1").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_cancel_after_terminal_is_too_late() {
        let store = InMemoryJobStore::new();
        let job = running_job(&store).await;
        store.complete(&job.id, predict_result()).await.unwrap();

        let outcome = store.cancel(&job.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::TooLate);
        // 结果未被推翻
        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        assert!(snapshot.result.is_some());
    }

    #[tokio::test]
    async fn test_completion_beats_cancel_race() {
        let store = InMemoryJobStore::new();
        let job = running_job(&store).await;

        // 完成先写入，取消方收到too-late
        store.complete(&job.id, predict_result()).await.unwrap();
        assert_eq!(store.cancel(&job.id).await.unwrap(), CancelOutcome::TooLate);

        // 反向竞态: 取消先写入，完成方收到冲突
        let job2 = running_job(&store).await;
        assert_eq!(
            store.cancel(&job2.id).await.unwrap(),
            CancelOutcome::Cancelled
        );
        let err = store.complete(&job2.id, predict_result()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_find_running_filters_by_status() {
        let store = InMemoryJobStore::new();
        let running = running_job(&store).await;
        let pending = Job::new(JobKind::Train);
        store.create(&pending).await.unwrap();

        let jobs = store.find_running().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, running.id);
    }

    #[tokio::test]
    async fn test_remove_for_admission_rollback() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::Train);
        store.create(&job).await.unwrap();

        assert!(store.remove(&job.id).await.unwrap());
        assert!(!store.remove(&job.id).await.unwrap());
        assert!(matches!(
            store.get(&job.id).await,
            Err(AutoMlError::JobNotFound { .. })
        ));
    }
}
