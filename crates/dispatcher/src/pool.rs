//! Worker池
//!
//! 按配置为训练与预测队列各启动若干Worker。每个Worker是一个
//! 独立的tokio任务，经broadcast信号统一关闭；训练积压不会
//! 阻塞预测队列的消费。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use automl_domain::ports::{JobQueue, JobRepository};
use automl_ml::artifacts::ArtifactStore;
use automl_ml::recommendation::RecommendationRules;
use automl_worker::{default_worker_id, PredictExecutor, TrainExecutor, WorkerService};

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub train_queue: String,
    pub predict_queue: String,
    pub train_workers: usize,
    pub predict_workers: usize,
    pub heartbeat_interval: Duration,
    pub max_job_duration: Option<Duration>,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动全部Worker，立即返回；Worker随关闭信号退出
    pub fn start(
        config: WorkerPoolConfig,
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn JobRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        rules: RecommendationRules,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let mut handles = Vec::new();

        for index in 0..config.train_workers {
            let executor = Arc::new(TrainExecutor::new(Arc::clone(&artifacts), rules.clone()));
            let service = WorkerService::builder(
                default_worker_id(&config.train_queue, index),
                config.train_queue.clone(),
                Arc::clone(&queue),
                Arc::clone(&repository),
                executor,
            )
            .heartbeat_interval(config.heartbeat_interval)
            .max_job_duration(config.max_job_duration)
            .build();
            let receiver = shutdown.subscribe();
            handles.push(tokio::spawn(async move { service.run(receiver).await }));
        }

        for index in 0..config.predict_workers {
            let executor = Arc::new(PredictExecutor::new(Arc::clone(&artifacts)));
            let service = WorkerService::builder(
                default_worker_id(&config.predict_queue, index),
                config.predict_queue.clone(),
                Arc::clone(&queue),
                Arc::clone(&repository),
                executor,
            )
            .heartbeat_interval(config.heartbeat_interval)
            .max_job_duration(config.max_job_duration)
            .build();
            let receiver = shutdown.subscribe();
            handles.push(tokio::spawn(async move { service.run(receiver).await }));
        }

        info!(
            "Worker池已启动: {} 个训练Worker, {} 个预测Worker",
            config.train_workers, config.predict_workers
        );
        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// 等待所有Worker退出（先通过broadcast发送关闭信号）
    pub async fn join(self) {
        futures::future::join_all(self.handles).await;
        info!("Worker池已全部停止");
    }
}
