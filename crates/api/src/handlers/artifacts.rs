use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiResult;
use crate::response::ArtifactListResponse;
use crate::routes::AppState;

/// 列出全部模型产物
pub async fn list_artifacts(
    State(state): State<AppState>,
) -> ApiResult<Json<ArtifactListResponse>> {
    let artifacts = state.job_service.list_artifacts().await?;
    Ok(Json(ArtifactListResponse { artifacts }))
}

/// 删除一个模型产物，这是产物唯一的删除途径
pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.job_service.delete_artifact(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
