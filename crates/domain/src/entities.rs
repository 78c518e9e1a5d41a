use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 异步任务
///
/// 表示一次训练或预测请求的完整生命周期状态。任务由API创建，
/// 由认领它的Worker独占写入，任意数量的轮询方只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 进度百分比，Running期间单调不减，仅在Succeeded时到达100
    pub progress: u8,
    /// 当前步骤的人类可读描述
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// 进入终止状态的时间，只会被设置一次
    pub finished_at: Option<DateTime<Utc>>,
    /// Worker最近一次心跳时间，Reaper据此判定Worker失联
    pub last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobKind {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "predict")]
    Predict,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Train => "train",
            JobKind::Predict => "predict",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态机
///
/// `Pending → Running → {Succeeded, Failed, Cancelled}`，
/// `Cancelled` 也可以直接从 `Pending` 到达。终止状态不可再变更。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            message: "任务等待执行".to_string(),
            result: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_heartbeat: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::Running)
    }
}

/// 任务结果，按任务类型区分的封闭联合
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum JobResult {
    #[serde(rename = "train")]
    Train(TrainResult),
    #[serde(rename = "predict")]
    Predict(PredictResult),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainResult {
    pub artifact_name: String,
    pub artifact_path: String,
    pub problem_type: ProblemType,
    pub algorithm: String,
    pub target_column: Option<String>,
    pub feature_columns: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    /// 面向非专业用户的指标含义说明
    pub explanation: String,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResult {
    pub artifact_name: String,
    /// 预测值与输入记录一一对应，保持输入顺序
    pub predictions: Vec<serde_json::Value>,
    pub record_count: usize,
}

/// 结构化的任务错误，阶段名与底层原因原样透出到任务快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobError {
    pub stage: String,
    pub kind: JobErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobErrorKind {
    #[serde(rename = "VALIDATION")]
    Validation,
    #[serde(rename = "PIPELINE")]
    Pipeline,
    #[serde(rename = "WORKER_LOST")]
    WorkerLost,
    #[serde(rename = "TIMED_OUT")]
    TimedOut,
    #[serde(rename = "INFRASTRUCTURE")]
    Infrastructure,
    #[serde(rename = "INTERNAL")]
    Internal,
}

impl JobError {
    pub fn new<S: Into<String>, M: Into<String>>(stage: S, kind: JobErrorKind, message: M) -> Self {
        Self {
            stage: stage.into(),
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail<D: Into<String>>(mut self, detail: D) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Worker心跳超时，由Reaper写入
    pub fn worker_lost() -> Self {
        Self::new("execution", JobErrorKind::WorkerLost, "worker lost")
    }

    pub fn timed_out(limit_seconds: u64) -> Self {
        Self::new(
            "execution",
            JobErrorKind::TimedOut,
            format!("任务执行超过最大时长 {limit_seconds}s"),
        )
    }

    /// 将流水线错误折算为对应的错误类别，保留底层消息
    pub fn from_automl<S: Into<String>>(stage: S, err: &automl_errors::AutoMlError) -> Self {
        use automl_errors::AutoMlError;
        let kind = match err {
            AutoMlError::Validation(_)
            | AutoMlError::UnsupportedModelType(_)
            | AutoMlError::DatasetNotFound { .. }
            | AutoMlError::ArtifactNotFound { .. } => JobErrorKind::Validation,
            AutoMlError::Pipeline { .. } | AutoMlError::Data(_) => JobErrorKind::Pipeline,
            AutoMlError::Timeout(_) => JobErrorKind::TimedOut,
            AutoMlError::MessageQueue(_) | AutoMlError::QueueFull { .. } | AutoMlError::Io(_) => {
                JobErrorKind::Infrastructure
            }
            _ => JobErrorKind::Internal,
        };
        Self::new(stage, kind, err.to_string())
    }
}

/// 取消请求的结果: 任务已终止时返回 `TooLate`，不覆盖已有结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    TooLate,
}

/// 训练请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingRequest {
    /// `data/` 目录下的数据集文件名
    pub dataset_ref: String,
    pub target_column: Option<String>,
    #[serde(default)]
    pub model_type: ModelType,
    /// 为空时使用除目标列以外的全部列
    pub features: Option<Vec<String>>,
}

/// 预测请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictRequest {
    pub artifact_ref: String,
    /// 每条记录是特征名到取值的扁平映射
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "classification")]
    Classification,
    #[serde(rename = "regression")]
    Regression,
    #[serde(rename = "clustering")]
    Clustering,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Auto => "auto",
            ModelType::Classification => "classification",
            ModelType::Regression => "regression",
            ModelType::Clustering => "clustering",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 推荐引擎给出的问题类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProblemType {
    Classification,
    Regression,
    Clustering,
    Recommendation,
    TimeSeries,
    GeneralPurpose,
}

impl ProblemType {
    /// 产物文件名中使用的小写片段
    pub fn file_slug(&self) -> &'static str {
        match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
            ProblemType::Clustering => "clustering",
            ProblemType::Recommendation => "recommendation",
            ProblemType::TimeSeries => "timeseries",
            ProblemType::GeneralPurpose => "general_purpose",
        }
    }

    /// 自动模式下可直接进入训练的类型
    pub fn is_trainable(&self) -> bool {
        matches!(
            self,
            ProblemType::Classification | ProblemType::Regression | ProblemType::Clustering
        )
    }
}

/// 推荐结果: 候选问题类型有序且永不为空，理由字符串必定非空
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub candidates: Vec<ProblemType>,
    pub rationale: String,
}

/// 队列消息，携带Worker执行任务所需的全部负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: String,
    pub job_id: String,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum JobPayload {
    #[serde(rename = "train")]
    Train(TrainingRequest),
    #[serde(rename = "predict")]
    Predict(PredictRequest),
}

impl JobMessage {
    pub fn train(job_id: String, request: TrainingRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            kind: JobKind::Train,
            payload: JobPayload::Train(request),
            enqueued_at: Utc::now(),
        }
    }

    pub fn predict(job_id: String, request: PredictRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            kind: JobKind::Predict,
            payload: JobPayload::Predict(request),
            enqueued_at: Utc::now(),
        }
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
