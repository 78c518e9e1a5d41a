use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoMlError {
    #[error("任务未找到: {id}")]
    JobNotFound { id: String },
    #[error("数据集未找到: {name}")]
    DatasetNotFound { name: String },
    #[error("模型产物未找到: {name}")]
    ArtifactNotFound { name: String },
    #[error("非法的任务状态转换: 任务 {id} 无法从 {from} 变为 {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },
    #[error("状态冲突: {0}")]
    Conflict(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("不支持的模型类型: {0}")]
    UnsupportedModelType(String),
    #[error("队列已满: {queue}")]
    QueueFull { queue: String },
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("流水线执行错误: 阶段 {stage} - {message}")]
    Pipeline { stage: String, message: String },
    #[error("数据处理错误: {0}")]
    Data(#[from] polars::error::PolarsError),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("任务执行超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type AutoMlResult<T> = Result<T, AutoMlError>;

impl AutoMlError {
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn dataset_not_found<S: Into<String>>(name: S) -> Self {
        Self::DatasetNotFound { name: name.into() }
    }
    pub fn artifact_not_found<S: Into<String>>(name: S) -> Self {
        Self::ArtifactNotFound { name: name.into() }
    }
    pub fn invalid_transition<S: Into<String>>(id: S, from: &str, to: &str) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn pipeline<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 冲突类错误: 请求与任务当前状态不符，调用方可据此识别竞态
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AutoMlError::Conflict(_) | AutoMlError::InvalidTransition { .. }
        )
    }

    /// 可重试的基础设施类错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutoMlError::MessageQueue(_) | AutoMlError::QueueFull { .. } | AutoMlError::Timeout(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            AutoMlError::JobNotFound { .. } => "请求的任务不存在",
            AutoMlError::DatasetNotFound { .. } => "请求的数据集不存在",
            AutoMlError::ArtifactNotFound { .. } => "请求的模型产物不存在",
            AutoMlError::InvalidTransition { .. } | AutoMlError::Conflict(_) => {
                "任务状态已发生变化，请刷新后重试"
            }
            AutoMlError::Validation(_) => "输入数据验证失败",
            AutoMlError::UnsupportedModelType(_) => "请求的模型类型不受支持",
            AutoMlError::QueueFull { .. } => "系统繁忙，任务队列已满，请稍后重试",
            AutoMlError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for AutoMlError {
    fn from(err: serde_json::Error) -> Self {
        AutoMlError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for AutoMlError {
    fn from(err: anyhow::Error) -> Self {
        AutoMlError::Internal(err.to_string())
    }
}
