//! 模型产物
//!
//! 产物是一个不可变的JSON文件: 元信息加上序列化的已训练模型。
//! 文件一经写入绝不修改，新的训练总是产生新路径。

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use automl_domain::ProblemType;
use automl_errors::AutoMlResult;

use crate::model::TrainedModel;

/// 产物元信息，`GET /artifacts` 返回的内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMeta {
    pub name: String,
    pub path: String,
    pub problem_type: ProblemType,
    pub algorithm: String,
    pub target_column: Option<String>,
    pub feature_columns: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    /// 训练所用数据集的文件名（不含扩展名）
    pub dataset: String,
    pub created_at: DateTime<Utc>,
}

/// 落盘的完整产物文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub meta: ArtifactMeta,
    pub model: TrainedModel,
}

/// 尚未命名落盘的产物草稿，命名与路径由存储决定
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub dataset: String,
    pub problem_type: ProblemType,
    pub algorithm: String,
    pub target_column: Option<String>,
    pub feature_columns: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub model: TrainedModel,
}

/// 产物与数据集存储抽象
///
/// 实现必须保证: 产物文件写入后不可变，同名冲突通过追加版本
/// 后缀产生新路径而不是覆盖。
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// 持久化产物，返回填充了名称/路径/时间的元信息
    async fn save(&self, draft: ArtifactDraft) -> AutoMlResult<ArtifactMeta>;

    /// 按名称加载产物文件
    async fn load(&self, name: &str) -> AutoMlResult<ArtifactDocument>;

    /// 列出全部产物的元信息
    async fn list(&self) -> AutoMlResult<Vec<ArtifactMeta>>;

    /// 删除一个产物文件，这是产物唯一的删除途径
    async fn delete(&self, name: &str) -> AutoMlResult<()>;

    /// 产物名存在性检查（预测提交时的同步校验用）
    async fn exists(&self, name: &str) -> AutoMlResult<bool>;

    /// 解析数据集引用为 `data/` 下的路径
    fn dataset_path(&self, dataset_ref: &str) -> AutoMlResult<PathBuf>;
}
