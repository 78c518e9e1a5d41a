use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    artifacts::{delete_artifact, list_artifacts},
    health::health_check,
    jobs::{cancel_job, get_job, submit_predict_job, submit_train_job},
};
use crate::service::JobService;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<JobService>,
}

/// 创建API路由
pub fn create_routes(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 任务API
        .route("/jobs/train", post(submit_train_job))
        .route("/jobs/predict", post(submit_predict_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        // 产物API
        .route("/artifacts", get(list_artifacts))
        .route("/artifacts/{name}", delete(delete_artifact))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
