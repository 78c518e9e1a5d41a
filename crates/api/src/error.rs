use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use automl_errors::AutoMlError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("核心错误: {0}")]
    Core(#[from] AutoMlError),

    #[error("验证错误: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = match &self {
            ApiError::Core(AutoMlError::JobNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 {id} 不存在"),
                "JOB_NOT_FOUND".to_string(),
                vec![
                    "请检查任务ID是否正确".to_string(),
                    "任务ID由提交接口返回".to_string(),
                ],
            ),
            ApiError::Core(AutoMlError::DatasetNotFound { name }) => (
                StatusCode::NOT_FOUND,
                format!("数据集 {name} 不存在"),
                "DATASET_NOT_FOUND".to_string(),
                vec!["请确认数据集文件已上传到 data/ 目录".to_string()],
            ),
            ApiError::Core(AutoMlError::ArtifactNotFound { name }) => (
                StatusCode::NOT_FOUND,
                format!("模型产物 {name} 不存在"),
                "ARTIFACT_NOT_FOUND".to_string(),
                vec!["使用 GET /artifacts 查看所有可用产物".to_string()],
            ),
            ApiError::Core(err @ AutoMlError::InvalidTransition { .. })
            | ApiError::Core(err @ AutoMlError::Conflict(_)) => (
                StatusCode::CONFLICT,
                err.to_string(),
                "CONFLICT".to_string(),
                vec![
                    "请求的操作与任务当前状态冲突".to_string(),
                    "重新查询任务状态后再重试".to_string(),
                ],
            ),
            ApiError::Core(AutoMlError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("数据验证失败: {msg}"),
                "VALIDATION_ERROR".to_string(),
                vec!["请检查请求参数是否符合要求".to_string()],
            ),
            ApiError::Core(AutoMlError::UnsupportedModelType(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("不支持的模型类型: {msg}"),
                "UNSUPPORTED_MODEL_TYPE".to_string(),
                vec!["model_type 只支持 auto/classification/regression/clustering".to_string()],
            ),
            ApiError::Core(AutoMlError::QueueFull { queue }) => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("队列 {queue} 已满，任务未被接受"),
                "QUEUE_FULL".to_string(),
                vec!["系统当前繁忙，请稍后重新提交".to_string()],
            ),
            ApiError::Core(err @ AutoMlError::MessageQueue(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "QUEUE_UNAVAILABLE".to_string(),
                vec!["基础设施暂时不可用，可以安全地重试".to_string()],
            ),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数验证失败: {errors}"),
                "VALIDATION_ERROR".to_string(),
                vec!["请检查请求参数是否符合要求".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST".to_string(),
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::Core(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR".to_string(),
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
