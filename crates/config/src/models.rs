use serde::{Deserialize, Serialize};

use automl_errors::{AutoMlError, AutoMlResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if self.bind_address.is_empty() {
            return Err(AutoMlError::config_error("api.bind_address 不能为空"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(AutoMlError::config_error(
                "api.request_timeout_seconds 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 持久化目录布局: 数据集与模型产物分属两个前缀，文件一经写入不再变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub models_dir: String,
}

impl StorageConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if self.data_dir.is_empty() || self.models_dir.is_empty() {
            return Err(AutoMlError::config_error(
                "storage.data_dir 和 storage.models_dir 不能为空",
            ));
        }
        Ok(())
    }
}

/// 队列配置: 训练与预测使用独立队列，避免长训练任务饿死快速预测任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub train_queue: String,
    pub predict_queue: String,
    /// 单队列容量上限，0表示不限制（生产环境应保持有界以形成背压）
    pub capacity: usize,
}

impl QueueConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if self.train_queue.is_empty() || self.predict_queue.is_empty() {
            return Err(AutoMlError::config_error("队列名称不能为空"));
        }
        if self.train_queue == self.predict_queue {
            return Err(AutoMlError::config_error("训练与预测队列不能同名"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// 训练Worker数量
    pub train_workers: usize,
    /// 预测Worker数量
    pub predict_workers: usize,
    pub heartbeat_interval_seconds: u64,
    /// 单个任务的最大执行时长（秒），0表示不设看门狗
    pub max_job_duration_seconds: u64,
}

impl WorkerConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if self.train_workers == 0 && self.predict_workers == 0 {
            return Err(AutoMlError::config_error("至少需要一个Worker"));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(AutoMlError::config_error(
                "worker.heartbeat_interval_seconds 必须大于0",
            ));
        }
        Ok(())
    }

    pub fn max_job_duration(&self) -> Option<std::time::Duration> {
        if self.max_job_duration_seconds == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.max_job_duration_seconds))
        }
    }
}

/// Reaper配置: 心跳停滞超过 `missed_heartbeats` 个周期的Running任务
/// 会被判定为Worker失联并置为Failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub missed_heartbeats: u32,
    pub scan_interval_seconds: u64,
}

impl ReaperConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if self.missed_heartbeats == 0 {
            return Err(AutoMlError::config_error(
                "reaper.missed_heartbeats 必须大于0",
            ));
        }
        if self.scan_interval_seconds == 0 {
            return Err(AutoMlError::config_error(
                "reaper.scan_interval_seconds 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 推荐引擎阈值
///
/// 0.05 与 20 是契约默认值，除非通过本节显式重新配置，
/// 否则判定行为必须与默认值保持一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// 数值目标列被判为连续型所需的唯一值占比
    pub continuous_unique_ratio: f64,
    /// 连续型判定要求的最小行数
    pub continuous_min_rows: usize,
}

impl RecommendationConfig {
    pub fn validate(&self) -> AutoMlResult<()> {
        if !(0.0..=1.0).contains(&self.continuous_unique_ratio) {
            return Err(AutoMlError::config_error(
                "recommendation.continuous_unique_ratio 必须在 0 到 1 之间",
            ));
        }
        Ok(())
    }
}
