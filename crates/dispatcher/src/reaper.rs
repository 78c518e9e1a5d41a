//! 失联Worker回收
//!
//! 周期扫描Running任务，心跳停滞超过阈值的任务判定为Worker
//! 崩溃，置为Failed并标注 "worker lost"。系统不自动重提交，
//! 由调用方决定是否重试。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use automl_domain::entities::{Job, JobError};
use automl_domain::ports::JobRepository;
use automl_errors::AutoMlResult;

#[derive(Debug, Clone)]
pub struct JobReaperConfig {
    /// 心跳超时（秒），超过即判定Worker失联
    pub heartbeat_timeout_seconds: i64,
    /// 扫描间隔
    pub scan_interval: Duration,
}

impl Default for JobReaperConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 15,
            scan_interval: Duration::from_secs(10),
        }
    }
}

pub struct JobReaper {
    repository: Arc<dyn JobRepository>,
    config: JobReaperConfig,
}

impl JobReaper {
    pub fn new(repository: Arc<dyn JobRepository>, config: JobReaperConfig) -> Self {
        Self { repository, config }
    }

    fn is_stale(&self, job: &Job, now: DateTime<Utc>) -> bool {
        // 认领时心跳即被初始化，没有心跳的Running任务按开始时间兜底
        let last_seen = job.last_heartbeat.or(job.started_at);
        match last_seen {
            Some(seen) => (now - seen).num_seconds() > self.config.heartbeat_timeout_seconds,
            None => true,
        }
    }

    /// 单轮扫描，返回本轮回收的任务数
    pub async fn reap_once(&self) -> AutoMlResult<usize> {
        let now = Utc::now();
        let running = self.repository.find_running().await?;
        let mut reaped = 0;
        for job in running {
            if !self.is_stale(&job, now) {
                continue;
            }
            warn!(
                "任务 {} 的Worker {:?} 心跳停滞，判定为失联",
                job.id, job.worker_id
            );
            match self.repository.fail(&job.id, JobError::worker_lost()).await {
                Ok(()) => reaped += 1,
                // 与任务自然结束的竞态: 先写入者获胜
                Err(e) if e.is_conflict() => {
                    debug!("任务 {} 在回收前已终止: {}", job.id, e)
                }
                Err(e) => warn!("回收任务 {} 失败: {}", job.id, e),
            }
        }
        if reaped > 0 {
            info!("本轮回收了 {} 个失联任务", reaped);
        }
        Ok(reaped)
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Reaper启动 (心跳超时: {}s, 扫描间隔: {:?})",
            self.config.heartbeat_timeout_seconds, self.config.scan_interval
        );
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Reaper收到关闭信号");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_once().await {
                        warn!("Reaper扫描失败: {}", e);
                    }
                }
            }
        }
    }
}
