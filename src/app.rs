use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use automl_api::{create_routes, AppState, JobService};
use automl_config::AppConfig;
use automl_dispatcher::{JobReaper, JobReaperConfig, WorkerPool, WorkerPoolConfig};
use automl_domain::ports::{JobQueue, JobRepository};
use automl_infrastructure::{FsArtifactStore, InMemoryJobQueue, InMemoryJobStore};
use automl_ml::artifacts::ArtifactStore;
use automl_ml::recommendation::RecommendationRules;

use crate::shutdown::ShutdownManager;

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 仅运行API服务器
    Api,
    /// 仅运行Worker池与Reaper
    Worker,
    /// 运行所有组件
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    repository: Arc<dyn JobRepository>,
    queue: Arc<dyn JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let repository: Arc<dyn JobRepository> = Arc::new(InMemoryJobStore::new());

        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        queue
            .create_queue(&config.queues.train_queue, config.queues.capacity)
            .await?;
        queue
            .create_queue(&config.queues.predict_queue, config.queues.capacity)
            .await?;

        let artifacts: Arc<dyn ArtifactStore> = Arc::new(
            FsArtifactStore::new(&config.storage.data_dir, &config.storage.models_dir)
                .context("初始化产物存储失败")?,
        );

        Ok(Self {
            config,
            mode,
            repository,
            queue,
            artifacts,
        })
    }

    /// 运行应用，直到收到关闭信号
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Api => {
                self.serve_api(shutdown).await?;
            }
            AppMode::Worker => {
                let pool = self.start_workers(shutdown);
                self.start_reaper(shutdown);
                let mut rx = shutdown.subscribe();
                let _ = rx.recv().await;
                pool.join().await;
            }
            AppMode::All => {
                let pool = self.start_workers(shutdown);
                self.start_reaper(shutdown);
                self.serve_api(shutdown).await?;
                pool.join().await;
            }
        }

        Ok(())
    }

    fn recommendation_rules(&self) -> RecommendationRules {
        RecommendationRules {
            continuous_unique_ratio: self.config.recommendation.continuous_unique_ratio,
            continuous_min_rows: self.config.recommendation.continuous_min_rows,
        }
    }

    fn start_workers(&self, shutdown: &ShutdownManager) -> WorkerPool {
        WorkerPool::start(
            WorkerPoolConfig {
                train_queue: self.config.queues.train_queue.clone(),
                predict_queue: self.config.queues.predict_queue.clone(),
                train_workers: self.config.worker.train_workers,
                predict_workers: self.config.worker.predict_workers,
                heartbeat_interval: Duration::from_secs(
                    self.config.worker.heartbeat_interval_seconds,
                ),
                max_job_duration: self.config.worker.max_job_duration(),
            },
            Arc::clone(&self.queue),
            Arc::clone(&self.repository),
            Arc::clone(&self.artifacts),
            self.recommendation_rules(),
            shutdown.sender(),
        )
    }

    fn start_reaper(&self, shutdown: &ShutdownManager) {
        if !self.config.reaper.enabled {
            info!("Reaper已禁用");
            return;
        }
        let timeout_seconds = (self.config.reaper.missed_heartbeats as u64
            * self.config.worker.heartbeat_interval_seconds) as i64;
        let reaper = JobReaper::new(
            Arc::clone(&self.repository),
            JobReaperConfig {
                heartbeat_timeout_seconds: timeout_seconds,
                scan_interval: Duration::from_secs(self.config.reaper.scan_interval_seconds),
            },
        );
        let receiver = shutdown.subscribe();
        tokio::spawn(async move { reaper.run(receiver).await });
    }

    async fn serve_api(&self, shutdown: &ShutdownManager) -> Result<()> {
        let job_service = Arc::new(JobService::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.queue),
            Arc::clone(&self.artifacts),
            self.config.queues.train_queue.clone(),
            self.config.queues.predict_queue.clone(),
        ));
        let router = create_routes(AppState { job_service }, self.config.api.cors_enabled);

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器监听 {}", self.config.api.bind_address);

        let mut rx = shutdown.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}
