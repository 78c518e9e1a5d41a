//! 文件系统产物存储
//!
//! 数据集在 `data/` 前缀下，模型产物在 `models/` 前缀下。
//! 产物文件以 create-new 语义写入，同名冲突追加版本后缀，
//! 已有文件永远不会被覆盖。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use automl_errors::{AutoMlError, AutoMlResult};
use automl_ml::artifacts::{ArtifactDocument, ArtifactDraft, ArtifactMeta, ArtifactStore};
use automl_ml::dataset::resolve_dataset_path;

pub struct FsArtifactStore {
    data_dir: PathBuf,
    models_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> AutoMlResult<Self> {
        let data_dir = data_dir.into();
        let models_dir = models_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self {
            data_dir,
            models_dir,
        })
    }

    fn artifact_path(&self, name: &str) -> AutoMlResult<PathBuf> {
        validate_artifact_name(name)?;
        Ok(self.models_dir.join(name))
    }
}

fn validate_artifact_name(name: &str) -> AutoMlResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(AutoMlError::validation(format!("非法的产物名称: {name}")));
    }
    Ok(())
}

/// 打开一个必须不存在的新文件，用于保证产物不可变
async fn create_new(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, draft: ArtifactDraft) -> AutoMlResult<ArtifactMeta> {
        let base = format!("{}_{}_model", draft.dataset, draft.problem_type.file_slug());

        // 确定性命名: 首选 {base}.json，被占用时递增版本后缀
        let mut version = 1usize;
        let (name, mut file) = loop {
            let candidate = if version == 1 {
                format!("{base}.json")
            } else {
                format!("{base}_v{version}.json")
            };
            let path = self.models_dir.join(&candidate);
            match create_new(&path).await {
                Ok(file) => break (candidate, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    version += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let path = self.models_dir.join(&name);
        let meta = ArtifactMeta {
            name: name.clone(),
            path: path.to_string_lossy().to_string(),
            problem_type: draft.problem_type,
            algorithm: draft.algorithm,
            target_column: draft.target_column,
            feature_columns: draft.feature_columns,
            metrics: draft.metrics,
            dataset: draft.dataset,
            created_at: Utc::now(),
        };
        let document = ArtifactDocument {
            meta: meta.clone(),
            model: draft.model,
        };

        let write = async {
            let bytes = serde_json::to_vec(&document)?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            Ok::<_, AutoMlError>(())
        };
        if let Err(e) = write.await {
            // 写入失败时回收占位文件，不在磁盘上留下半成品产物
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        info!("模型产物已写入 {}", meta.path);
        Ok(meta)
    }

    async fn load(&self, name: &str) -> AutoMlResult<ArtifactDocument> {
        let path = self.artifact_path(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AutoMlError::artifact_not_found(name))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list(&self) -> AutoMlResult<Vec<ArtifactMeta>> {
        let mut metas = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.models_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<ArtifactDocument>(&bytes) {
                    Ok(document) => metas.push(document.meta),
                    Err(e) => warn!("跳过无法解析的产物文件 {:?}: {}", path, e),
                },
                Err(e) => warn!("跳过无法读取的产物文件 {:?}: {}", path, e),
            }
        }
        metas.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(metas)
    }

    async fn delete(&self, name: &str) -> AutoMlResult<()> {
        let path = self.artifact_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("模型产物已删除 {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AutoMlError::artifact_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> AutoMlResult<bool> {
        let path = self.artifact_path(name)?;
        Ok(path.is_file())
    }

    fn dataset_path(&self, dataset_ref: &str) -> AutoMlResult<PathBuf> {
        resolve_dataset_path(&self.data_dir, dataset_ref)
    }
}
