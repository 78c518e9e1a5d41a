//! 任务执行器
//!
//! 每种任务类型一个执行器。执行器在阶段边界检查取消标记，
//! 观察到取消时立刻返回，不在磁盘上留下产物。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use automl_domain::cancellation::CancellationFlag;
use automl_domain::entities::{
    JobKind, JobPayload, JobResult, PredictResult, TrainResult, TrainingRequest,
};
use automl_domain::ports::JobRepository;
use automl_errors::{AutoMlError, AutoMlResult};
use automl_ml::artifacts::{ArtifactDraft, ArtifactStore};
use automl_ml::dataset::Dataset;
use automl_ml::recommendation::{recommend, RecommendationRules};
use automl_ml::{predict_records, resolve_features, resolve_problem_type, train};

/// 执行结果: 正常完成，或在检查点观察到取消而中止
#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed(JobResult),
    Cancelled,
}

/// 进度上报句柄
///
/// 终止态任务上的进度写入会被存储拒绝，这是与取消竞态的正常
/// 表现，这里降级为警告而不是中断执行。
#[derive(Clone)]
pub struct ProgressReporter {
    repository: Arc<dyn JobRepository>,
    job_id: String,
}

impl ProgressReporter {
    pub fn new(repository: Arc<dyn JobRepository>, job_id: String) -> Self {
        Self { repository, job_id }
    }

    pub async fn report(&self, percent: u8, message: &str) {
        if let Err(e) = self
            .repository
            .update_progress(&self.job_id, percent, message)
            .await
        {
            warn!("任务 {} 进度更新被拒绝: {}", self.job_id, e);
        }
    }
}

/// 一次任务执行的上下文
pub struct ExecutionContext {
    pub job_id: String,
    pub payload: JobPayload,
    pub progress: ProgressReporter,
    pub cancellation: CancellationFlag,
}

impl ExecutionContext {
    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> JobKind;

    async fn execute(&self, ctx: &ExecutionContext) -> AutoMlResult<ExecutionOutcome>;
}

/// 训练执行器: 推荐 → 拟合评估 → 产物落盘
pub struct TrainExecutor {
    artifacts: Arc<dyn ArtifactStore>,
    rules: RecommendationRules,
}

impl TrainExecutor {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, rules: RecommendationRules) -> Self {
        Self { artifacts, rules }
    }
}

#[async_trait]
impl JobExecutor for TrainExecutor {
    fn name(&self) -> &str {
        "train-executor"
    }

    fn kind(&self) -> JobKind {
        JobKind::Train
    }

    async fn execute(&self, ctx: &ExecutionContext) -> AutoMlResult<ExecutionOutcome> {
        let request = match &ctx.payload {
            JobPayload::Train(request) => request.clone(),
            JobPayload::Predict(_) => {
                return Err(AutoMlError::Internal(
                    "训练执行器收到预测负载".to_string(),
                ))
            }
        };

        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(10, "加载数据集").await;

        let dataset_path = self.artifacts.dataset_path(&request.dataset_ref)?;
        let dataset =
            tokio::task::spawn_blocking(move || Dataset::load(&dataset_path))
                .await
                .map_err(|e| AutoMlError::Internal(format!("数据集加载任务中断: {e}")))??;

        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(25, "分析数据并推荐问题类型").await;

        let schema = dataset.schema()?;
        let recommendation = recommend(&schema, request.target_column.as_deref(), &self.rules);
        let problem_type = resolve_problem_type(request.model_type, &recommendation)?;
        let features = resolve_features(
            &dataset,
            request.target_column.as_deref(),
            request.features.as_deref(),
        )?;

        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(40, "拟合模型").await;

        let target = request.target_column.clone();
        let fit_features = features.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            train(&dataset, problem_type, target.as_deref(), &fit_features)
        })
        .await
        .map_err(|e| AutoMlError::Internal(format!("训练任务中断: {e}")))??;

        ctx.progress.report(70, "模型评估完成").await;

        // 产物写入是流水线最后一步: 在此之前取消不留任何文件
        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(90, "写入模型产物").await;

        let meta = self
            .artifacts
            .save(ArtifactDraft {
                dataset: dataset_basename(&request),
                problem_type: outcome.problem_type,
                algorithm: outcome.algorithm.clone(),
                target_column: outcome.target_column.clone(),
                feature_columns: outcome.feature_columns.clone(),
                metrics: outcome.metrics.clone(),
                model: outcome.model,
            })
            .await?;

        Ok(ExecutionOutcome::Completed(JobResult::Train(TrainResult {
            artifact_name: meta.name,
            artifact_path: meta.path,
            problem_type: outcome.problem_type,
            algorithm: outcome.algorithm,
            target_column: outcome.target_column,
            feature_columns: outcome.feature_columns,
            metrics: outcome.metrics,
            explanation: outcome.explanation,
            recommendation,
        })))
    }
}

fn dataset_basename(request: &TrainingRequest) -> String {
    std::path::Path::new(&request.dataset_ref)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&request.dataset_ref)
        .to_string()
}

/// 预测执行器: 加载产物 → 校验记录 → 批量打分
pub struct PredictExecutor {
    artifacts: Arc<dyn ArtifactStore>,
}

impl PredictExecutor {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl JobExecutor for PredictExecutor {
    fn name(&self) -> &str {
        "predict-executor"
    }

    fn kind(&self) -> JobKind {
        JobKind::Predict
    }

    async fn execute(&self, ctx: &ExecutionContext) -> AutoMlResult<ExecutionOutcome> {
        let request = match &ctx.payload {
            JobPayload::Predict(request) => request.clone(),
            JobPayload::Train(_) => {
                return Err(AutoMlError::Internal(
                    "预测执行器收到训练负载".to_string(),
                ))
            }
        };

        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(30, "加载模型产物").await;

        let document = self.artifacts.load(&request.artifact_ref).await?;

        if ctx.is_cancelled() {
            return Ok(ExecutionOutcome::Cancelled);
        }
        ctx.progress.report(60, "执行预测").await;

        let records = request.records.clone();
        let predictions =
            tokio::task::spawn_blocking(move || predict_records(&document, &records))
                .await
                .map_err(|e| AutoMlError::Internal(format!("预测任务中断: {e}")))??;

        let record_count = predictions.len();
        Ok(ExecutionOutcome::Completed(JobResult::Predict(
            PredictResult {
                artifact_name: request.artifact_ref,
                predictions,
                record_count,
            },
        )))
    }
}
