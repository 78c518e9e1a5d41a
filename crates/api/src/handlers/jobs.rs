use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use automl_domain::entities::{CancelOutcome, PredictRequest, TrainingRequest};

use crate::error::ApiResult;
use crate::response::{CancelJobResponse, JobSnapshot, SubmitJobResponse};
use crate::routes::AppState;
use crate::service::parse_model_type;

/// 训练任务提交请求
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTrainJobRequest {
    #[validate(length(min = 1, message = "dataset_ref 不能为空"))]
    pub dataset_ref: String,
    pub target_column: Option<String>,
    pub model_type: Option<String>,
    pub features: Option<Vec<String>>,
}

/// 预测任务提交请求
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePredictJobRequest {
    #[validate(length(min = 1, message = "artifact_ref 不能为空"))]
    pub artifact_ref: String,
    #[validate(length(min = 1, message = "records 不能为空"))]
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// 提交训练任务
pub async fn submit_train_job(
    State(state): State<AppState>,
    Json(request): Json<CreateTrainJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    request.validate()?;
    let model_type = parse_model_type(request.model_type.as_deref())?;
    let job_id = state
        .job_service
        .submit_train(TrainingRequest {
            dataset_ref: request.dataset_ref,
            target_column: request.target_column,
            model_type,
            features: request.features,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

/// 提交预测任务
pub async fn submit_predict_job(
    State(state): State<AppState>,
    Json(request): Json<CreatePredictJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    request.validate()?;
    let job_id = state
        .job_service
        .submit_predict(PredictRequest {
            artifact_ref: request.artifact_ref,
            records: request.records,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

/// 查询任务快照，轮询方重复调用直到终止状态
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let job = state.job_service.status(&job_id).await?;
    Ok(Json(JobSnapshot::from(job)))
}

/// 请求取消任务；ok=false 表示任务已终止，结局保持不变
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let outcome = state.job_service.cancel(&job_id).await?;
    Ok(Json(CancelJobResponse {
        ok: outcome == CancelOutcome::Cancelled,
    }))
}
