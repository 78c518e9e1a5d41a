pub mod models;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use models::{
    ApiConfig, QueueConfig, ReaperConfig, RecommendationConfig, StorageConfig, WorkerConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub queues: QueueConfig,
    pub worker: WorkerConfig,
    pub reaper: ReaperConfig,
    pub recommendation: RecommendationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                enabled: true,
                bind_address: "0.0.0.0:8080".to_string(),
                cors_enabled: true,
                request_timeout_seconds: 30,
            },
            storage: StorageConfig {
                data_dir: "data".to_string(),
                models_dir: "models".to_string(),
            },
            queues: QueueConfig {
                train_queue: "train_jobs".to_string(),
                predict_queue: "predict_jobs".to_string(),
                capacity: 256,
            },
            worker: WorkerConfig {
                train_workers: 2,
                predict_workers: 2,
                heartbeat_interval_seconds: 5,
                max_job_duration_seconds: 0,
            },
            reaper: ReaperConfig {
                enabled: true,
                missed_heartbeats: 3,
                scan_interval_seconds: 10,
            },
            recommendation: RecommendationConfig {
                continuous_unique_ratio: 0.05,
                continuous_min_rows: 20,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置: 指定文件 > 默认路径 > 内置默认值，环境变量(AUTOML_*)最后覆盖
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("api.enabled", defaults.api.enabled)?
            .set_default("api.bind_address", defaults.api.bind_address.clone())?
            .set_default("api.cors_enabled", defaults.api.cors_enabled)?
            .set_default(
                "api.request_timeout_seconds",
                defaults.api.request_timeout_seconds,
            )?
            .set_default("storage.data_dir", defaults.storage.data_dir.clone())?
            .set_default("storage.models_dir", defaults.storage.models_dir.clone())?
            .set_default("queues.train_queue", defaults.queues.train_queue.clone())?
            .set_default(
                "queues.predict_queue",
                defaults.queues.predict_queue.clone(),
            )?
            .set_default("queues.capacity", defaults.queues.capacity as u64)?
            .set_default("worker.train_workers", defaults.worker.train_workers as u64)?
            .set_default(
                "worker.predict_workers",
                defaults.worker.predict_workers as u64,
            )?
            .set_default(
                "worker.heartbeat_interval_seconds",
                defaults.worker.heartbeat_interval_seconds,
            )?
            .set_default(
                "worker.max_job_duration_seconds",
                defaults.worker.max_job_duration_seconds,
            )?
            .set_default("reaper.enabled", defaults.reaper.enabled)?
            .set_default(
                "reaper.missed_heartbeats",
                defaults.reaper.missed_heartbeats as u64,
            )?
            .set_default(
                "reaper.scan_interval_seconds",
                defaults.reaper.scan_interval_seconds,
            )?
            .set_default(
                "recommendation.continuous_unique_ratio",
                defaults.recommendation.continuous_unique_ratio,
            )?
            .set_default(
                "recommendation.continuous_min_rows",
                defaults.recommendation.continuous_min_rows as u64,
            )?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/automl.toml", "automl.toml", "/etc/automl/config.toml"];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("AUTOML")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(config)
    }

    pub fn validate(&self) -> automl_errors::AutoMlResult<()> {
        self.api.validate()?;
        self.storage.validate()?;
        self.queues.validate()?;
        self.worker.validate()?;
        self.reaper.validate()?;
        self.recommendation.validate()?;
        Ok(())
    }

    /// 某种任务类型对应的队列名
    pub fn queue_for_kind(&self, kind: &str) -> &str {
        if kind == "predict" {
            &self.queues.predict_queue
        } else {
            &self.queues.train_queue
        }
    }
}
