//! 任务提交/查询/取消的服务层
//!
//! 验证类失败在提交时同步拒绝，不会产生任务；队列满时已创建
//! 的任务在其ID暴露给调用方之前回滚，对外表现为从未受理。

use std::sync::Arc;

use tracing::{info, warn};

use automl_domain::entities::{
    CancelOutcome, Job, JobKind, JobMessage, ModelType, PredictRequest, TrainingRequest,
};
use automl_domain::ports::{JobQueue, JobRepository};
use automl_errors::{AutoMlError, AutoMlResult};
use automl_ml::artifacts::{ArtifactMeta, ArtifactStore};
use automl_ml::dataset::Dataset;
use automl_ml::resolve_features;

pub struct JobService {
    repository: Arc<dyn JobRepository>,
    queue: Arc<dyn JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    train_queue: String,
    predict_queue: String,
}

impl JobService {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        queue: Arc<dyn JobQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        train_queue: String,
        predict_queue: String,
    ) -> Self {
        Self {
            repository,
            queue,
            artifacts,
            train_queue,
            predict_queue,
        }
    }

    /// 提交训练任务，返回任务ID
    pub async fn submit_train(&self, request: TrainingRequest) -> AutoMlResult<String> {
        // 同步校验: 数据集存在、目标列与特征列合法，全部通过后才建任务
        let dataset_path = self.artifacts.dataset_path(&request.dataset_ref)?;
        let target = request.target_column.clone();
        let features = request.features.clone();
        tokio::task::spawn_blocking(move || -> AutoMlResult<()> {
            let dataset = Dataset::load(&dataset_path)?;
            if let Some(ref target) = target {
                if !dataset.has_column(target) {
                    return Err(AutoMlError::validation(format!("目标列不存在: {target}")));
                }
            }
            resolve_features(&dataset, target.as_deref(), features.as_deref())?;
            Ok(())
        })
        .await
        .map_err(|e| AutoMlError::Internal(format!("数据集校验任务中断: {e}")))??;

        let job = Job::new(JobKind::Train);
        self.repository.create(&job).await?;
        let message = JobMessage::train(job.id.clone(), request);
        self.enqueue(&self.train_queue, &job, &message).await?;

        info!("训练任务 {} 已受理", job.id);
        Ok(job.id)
    }

    /// 提交预测任务，返回任务ID
    pub async fn submit_predict(&self, request: PredictRequest) -> AutoMlResult<String> {
        if request.records.is_empty() {
            return Err(AutoMlError::validation("预测记录列表不能为空"));
        }
        if !self.artifacts.exists(&request.artifact_ref).await? {
            return Err(AutoMlError::artifact_not_found(&request.artifact_ref));
        }

        let job = Job::new(JobKind::Predict);
        self.repository.create(&job).await?;
        let message = JobMessage::predict(job.id.clone(), request);
        self.enqueue(&self.predict_queue, &job, &message).await?;

        info!("预测任务 {} 已受理", job.id);
        Ok(job.id)
    }

    /// 入队失败时回滚任务，保证被拒绝的提交不留痕迹
    async fn enqueue(&self, queue: &str, job: &Job, message: &JobMessage) -> AutoMlResult<()> {
        if let Err(e) = self.queue.try_publish(queue, message).await {
            if let Err(remove_err) = self.repository.remove(&job.id).await {
                warn!("回滚任务 {} 失败: {}", job.id, remove_err);
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> AutoMlResult<Job> {
        self.repository.get(job_id).await
    }

    pub async fn cancel(&self, job_id: &str) -> AutoMlResult<CancelOutcome> {
        self.repository.cancel(job_id).await
    }

    pub async fn list_artifacts(&self) -> AutoMlResult<Vec<ArtifactMeta>> {
        self.artifacts.list().await
    }

    pub async fn delete_artifact(&self, name: &str) -> AutoMlResult<()> {
        self.artifacts.delete(name).await
    }
}

/// 解析请求中的模型类型字符串，缺省为auto
pub fn parse_model_type(value: Option<&str>) -> AutoMlResult<ModelType> {
    match value {
        None => Ok(ModelType::Auto),
        Some("auto") => Ok(ModelType::Auto),
        Some("classification") => Ok(ModelType::Classification),
        Some("regression") => Ok(ModelType::Regression),
        Some("clustering") => Ok(ModelType::Clustering),
        Some(other) => Err(AutoMlError::UnsupportedModelType(other.to_string())),
    }
}
