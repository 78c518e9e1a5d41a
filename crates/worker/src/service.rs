//! Worker服务
//!
//! 每个Worker从所属队列顺序取消息，认领后完整执行一个任务再取
//! 下一个。执行期间以固定间隔刷新任务心跳；可选的看门狗限制
//! 单个任务的最大执行时长。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use automl_domain::entities::{JobError, JobMessage};
use automl_domain::ports::{JobQueue, JobRepository};
use automl_errors::AutoMlError;

use crate::executors::{ExecutionContext, ExecutionOutcome, JobExecutor, ProgressReporter};

pub struct WorkerServiceBuilder {
    worker_id: String,
    queue_name: String,
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn JobRepository>,
    executor: Arc<dyn JobExecutor>,
    heartbeat_interval: Duration,
    max_job_duration: Option<Duration>,
}

impl WorkerServiceBuilder {
    pub fn new(
        worker_id: String,
        queue_name: String,
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn JobRepository>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            worker_id,
            queue_name,
            queue,
            repository,
            executor,
            heartbeat_interval: Duration::from_secs(5),
            max_job_duration: None,
        }
    }

    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// 看门狗: 超过该时长的任务以TimedOut失败，None表示不限制
    pub fn max_job_duration(mut self, max_job_duration: Option<Duration>) -> Self {
        self.max_job_duration = max_job_duration;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            queue_name: self.queue_name,
            queue: self.queue,
            repository: self.repository,
            executor: self.executor,
            heartbeat_interval: self.heartbeat_interval,
            max_job_duration: self.max_job_duration,
        }
    }
}

pub struct WorkerService {
    worker_id: String,
    queue_name: String,
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn JobRepository>,
    executor: Arc<dyn JobExecutor>,
    heartbeat_interval: Duration,
    max_job_duration: Option<Duration>,
}

impl WorkerService {
    pub fn builder(
        worker_id: String,
        queue_name: String,
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn JobRepository>,
        executor: Arc<dyn JobExecutor>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(worker_id, queue_name, queue, repository, executor)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 主循环: 收到关闭信号或队列关闭时退出
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Worker {} 启动，消费队列 '{}'",
            self.worker_id, self.queue_name
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Worker {} 收到关闭信号", self.worker_id);
                    break;
                }
                received = self.queue.recv(&self.queue_name) => match received {
                    Ok(Some(message)) => self.process_message(message).await,
                    Ok(None) => {
                        info!("队列 '{}' 已关闭，Worker {} 退出", self.queue_name, self.worker_id);
                        break;
                    }
                    Err(e) => {
                        error!("Worker {} 取消息失败: {}", self.worker_id, e);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
        info!("Worker {} 已停止", self.worker_id);
    }

    async fn process_message(&self, message: JobMessage) {
        let job_id = message.job_id.clone();

        match self.repository.claim(&job_id, &self.worker_id).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                // 最常见的原因是任务在入队后、认领前被取消
                debug!("任务 {} 无法认领，跳过: {}", job_id, e);
                return;
            }
            Err(AutoMlError::JobNotFound { .. }) => {
                warn!("队列消息指向不存在的任务 {}", job_id);
                return;
            }
            Err(e) => {
                error!("认领任务 {} 失败: {}", job_id, e);
                return;
            }
        }

        let cancellation = match self.repository.cancellation_flag(&job_id).await {
            Ok(flag) => flag,
            Err(e) => {
                error!("获取任务 {} 的取消标记失败: {}", job_id, e);
                return;
            }
        };

        let ctx = ExecutionContext {
            job_id: job_id.clone(),
            payload: message.payload,
            progress: ProgressReporter::new(Arc::clone(&self.repository), job_id.clone()),
            cancellation,
        };

        let heartbeat = self.spawn_heartbeat(job_id.clone());

        let outcome = match self.max_job_duration {
            Some(limit) => {
                tokio::select! {
                    outcome = self.executor.execute(&ctx) => outcome,
                    _ = tokio::time::sleep(limit) => {
                        Err(AutoMlError::Timeout(format!(
                            "任务超过最大执行时长 {}s",
                            limit.as_secs()
                        )))
                    }
                }
            }
            None => self.executor.execute(&ctx).await,
        };

        heartbeat.abort();

        match outcome {
            Ok(ExecutionOutcome::Completed(result)) => {
                if let Err(e) = self.repository.complete(&job_id, result).await {
                    if e.is_conflict() {
                        // 完成与取消竞态，先写入者获胜
                        warn!("任务 {} 的完成写入被拒绝: {}", job_id, e);
                    } else {
                        error!("任务 {} 写入结果失败: {}", job_id, e);
                    }
                }
            }
            Ok(ExecutionOutcome::Cancelled) => {
                info!("任务 {} 在检查点观察到取消，已中止", job_id);
            }
            Err(e) => {
                let job_error = match (&e, self.max_job_duration) {
                    (AutoMlError::Timeout(_), Some(limit)) => JobError::timed_out(limit.as_secs()),
                    _ => JobError::from_automl("execution", &e),
                };
                warn!("任务 {} 执行失败: {}", job_id, e);
                if let Err(store_err) = self.repository.fail(&job_id, job_error).await {
                    if store_err.is_conflict() {
                        warn!("任务 {} 的失败写入被拒绝: {}", job_id, store_err);
                    } else {
                        error!("任务 {} 写入失败状态出错: {}", job_id, store_err);
                    }
                }
            }
        }
    }

    /// 执行期间定时刷新心跳，任务离开Running后自然停止
    fn spawn_heartbeat(&self, job_id: String) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // 第一个tick立即返回
            loop {
                ticker.tick().await;
                if repository.heartbeat(&job_id).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// 默认Worker标识: 主机名-队列-序号
pub fn default_worker_id(queue_name: &str, index: usize) -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{host}-{queue_name}-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use automl_domain::entities::{
        Job, JobKind, JobResult, JobStatus, PredictRequest, PredictResult,
    };
    use automl_infrastructure::{InMemoryJobQueue, InMemoryJobStore};

    /// 可控的测试执行器: 完成前等待一个信号
    struct StubExecutor {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl JobExecutor for StubExecutor {
        fn name(&self) -> &str {
            "stub-executor"
        }

        fn kind(&self) -> JobKind {
            JobKind::Predict
        }

        async fn execute(&self, ctx: &ExecutionContext) -> automl_errors::AutoMlResult<ExecutionOutcome> {
            tokio::time::sleep(self.delay).await;
            if ctx.cancellation.is_cancelled() {
                return Ok(ExecutionOutcome::Cancelled);
            }
            if self.fail {
                return Err(AutoMlError::pipeline("fit", "制造的失败"));
            }
            ctx.progress.report(60, "执行预测").await;
            Ok(ExecutionOutcome::Completed(JobResult::Predict(
                PredictResult {
                    artifact_name: "m.json".to_string(),
                    predictions: vec![serde_json::json!(1)],
                    record_count: 1,
                },
            )))
        }
    }

    fn predict_message(job_id: &str) -> JobMessage {
        JobMessage::predict(
            job_id.to_string(),
            PredictRequest {
                artifact_ref: "m.json".to_string(),
                records: vec![serde_json::Map::new()],
            },
        )
    }

    async fn setup(
        executor: StubExecutor,
        max_duration: Option<Duration>,
    ) -> (Arc<InMemoryJobStore>, Arc<InMemoryJobQueue>, WorkerService) {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.create_queue("predict_jobs", 8).await.unwrap();
        let service = WorkerService::builder(
            "worker-test".to_string(),
            "predict_jobs".to_string(),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&store) as Arc<dyn JobRepository>,
            Arc::new(executor),
        )
        .heartbeat_interval(Duration::from_millis(50))
        .max_job_duration(max_duration)
        .build();
        (store, queue, service)
    }

    async fn wait_terminal(store: &InMemoryJobStore, id: &str) -> Job {
        for _ in 0..100 {
            let job = store.get(id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_worker_runs_job_to_success() {
        let (store, queue, service) = setup(
            StubExecutor {
                delay: Duration::from_millis(10),
                fail: false,
            },
            None,
        )
        .await;

        let job = Job::new(JobKind::Predict);
        store.create(&job).await.unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&job.id))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        let finished = wait_terminal(&store, &job.id).await;
        assert_eq!(finished.status, JobStatus::Succeeded);
        assert_eq!(finished.progress, 100);
        assert!(finished.result.is_some());
        assert_eq!(finished.worker_id.as_deref(), Some("worker-test"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_records_failure_with_cause() {
        let (store, queue, service) = setup(
            StubExecutor {
                delay: Duration::from_millis(10),
                fail: true,
            },
            None,
        )
        .await;

        let job = Job::new(JobKind::Predict);
        store.create(&job).await.unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&job.id))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        let finished = wait_terminal(&store, &job.id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        let error = finished.error.unwrap();
        assert!(error.message.contains("制造的失败"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_pending_job_is_skipped() {
        let (store, queue, service) = setup(
            StubExecutor {
                delay: Duration::from_millis(10),
                fail: false,
            },
            None,
        )
        .await;

        let job = Job::new(JobKind::Predict);
        store.create(&job).await.unwrap();
        // 入队后立刻取消，Worker的认领必然失败
        store.cancel(&job.id).await.unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&job.id))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let job_after = store.get(&job.id).await.unwrap();
        assert_eq!(job_after.status, JobStatus::Cancelled);
        assert!(job_after.result.is_none());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_times_out_long_job() {
        let (store, queue, service) = setup(
            StubExecutor {
                delay: Duration::from_secs(30),
                fail: false,
            },
            Some(Duration::from_millis(100)),
        )
        .await;

        let job = Job::new(JobKind::Predict);
        store.create(&job).await.unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&job.id))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        let finished = wait_terminal(&store, &job.id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(
            finished.error.unwrap().kind,
            automl_domain::entities::JobErrorKind::TimedOut
        );

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_order_within_queue() {
        let (store, queue, service) = setup(
            StubExecutor {
                delay: Duration::from_millis(30),
                fail: false,
            },
            None,
        )
        .await;

        let first = Job::new(JobKind::Predict);
        let second = Job::new(JobKind::Predict);
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&first.id))
            .await
            .unwrap();
        queue
            .try_publish("predict_jobs", &predict_message(&second.id))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        let first_done = wait_terminal(&store, &first.id).await;
        let second_done = wait_terminal(&store, &second.id).await;
        // 单Worker下提交顺序即完成顺序
        assert!(first_done.finished_at.unwrap() <= second_done.finished_at.unwrap());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
