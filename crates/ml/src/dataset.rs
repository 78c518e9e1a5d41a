//! 数据集加载与schema推断
//!
//! 数据集是 `data/` 目录下的CSV文件，对本系统只读。
//! 列类型由polars在读取时推断，时间列的识别依赖于此。

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use polars::prelude::*;

use automl_errors::{AutoMlError, AutoMlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
    Boolean,
    Temporal,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub unique_count: usize,
}

/// 数据集的结构性描述，推荐引擎只依赖它而不触碰原始数据
#[derive(Debug, Clone)]
pub struct DatasetSchema {
    pub row_count: usize,
    pub columns: Vec<ColumnInfo>,
}

impl DatasetSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn temporal_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Temporal)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// 已加载的表格数据集
pub struct Dataset {
    name: String,
    df: DataFrame,
}

impl Dataset {
    /// 从CSV文件加载，列类型自动推断（包括日期解析）
    pub fn load(path: &Path) -> AutoMlResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset")
            .to_string();
        let df = CsvReader::from_path(path)?
            .has_header(true)
            .with_infer_schema_length(Some(512))
            .with_try_parse_dates(true)
            .finish()?;
        tracing::debug!(
            dataset = %name,
            rows = df.height(),
            columns = df.width(),
            "数据集加载完成"
        );
        Ok(Self { name, df })
    }

    /// 数据集文件名（不含扩展名），用于产物命名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_names().iter().any(|c| *c == name)
    }

    pub fn schema(&self) -> AutoMlResult<DatasetSchema> {
        let mut columns = Vec::with_capacity(self.df.width());
        for series in self.df.get_columns() {
            let kind = classify_dtype(series.dtype());
            let unique_count = series.n_unique()?;
            columns.push(ColumnInfo {
                name: series.name().to_string(),
                kind,
                unique_count,
            });
        }
        Ok(DatasetSchema {
            row_count: self.df.height(),
            columns,
        })
    }

    /// 将选定特征列转换为数值矩阵
    ///
    /// 无法转换为数值或含缺失值的列是流水线错误，错误中保留列名。
    pub fn feature_matrix(&self, features: &[String]) -> AutoMlResult<Array2<f64>> {
        let rows = self.df.height();
        let mut matrix = Array2::<f64>::zeros((rows, features.len()));
        for (j, feature) in features.iter().enumerate() {
            let series = self
                .df
                .column(feature)
                .map_err(|_| AutoMlError::validation(format!("特征列不存在: {feature}")))?;
            let values = numeric_values(series, feature)?;
            for (i, value) in values.into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        Ok(matrix)
    }

    /// 回归目标列
    pub fn numeric_target(&self, target: &str) -> AutoMlResult<Array1<f64>> {
        let series = self
            .df
            .column(target)
            .map_err(|_| AutoMlError::validation(format!("目标列不存在: {target}")))?;
        Ok(Array1::from(numeric_values(series, target)?))
    }

    /// 分类目标列，统一转成字符串标签
    pub fn label_target(&self, target: &str) -> AutoMlResult<Vec<String>> {
        let series = self
            .df
            .column(target)
            .map_err(|_| AutoMlError::validation(format!("目标列不存在: {target}")))?;
        let strings = series
            .cast(&DataType::String)
            .map_err(|e| AutoMlError::pipeline("load", format!("目标列 {target} 转换失败: {e}")))?;
        let ca = strings
            .str()
            .map_err(|e| AutoMlError::pipeline("load", format!("目标列 {target} 转换失败: {e}")))?;
        let mut labels = Vec::with_capacity(self.df.height());
        for i in 0..self.df.height() {
            match ca.get(i) {
                Some(v) => labels.push(v.to_string()),
                None => {
                    return Err(AutoMlError::pipeline(
                        "load",
                        format!("目标列 {target} 第 {i} 行缺失"),
                    ))
                }
            }
        }
        Ok(labels)
    }
}

fn classify_dtype(dtype: &DataType) -> ColumnKind {
    if matches!(dtype, DataType::Boolean) {
        ColumnKind::Boolean
    } else if dtype.is_temporal() {
        ColumnKind::Temporal
    } else if dtype.is_numeric() {
        ColumnKind::Numeric
    } else {
        ColumnKind::Text
    }
}

fn numeric_values(series: &Series, column: &str) -> AutoMlResult<Vec<f64>> {
    let cast = series.cast(&DataType::Float64).map_err(|_| {
        AutoMlError::pipeline("load", format!("特征列 {column} 无法转换为数值"))
    })?;
    if cast.null_count() > 0 {
        return Err(AutoMlError::pipeline(
            "load",
            format!("特征列 {column} 包含缺失值或非数值内容"),
        ));
    }
    let ca = cast
        .f64()
        .map_err(|e| AutoMlError::pipeline("load", format!("特征列 {column} 读取失败: {e}")))?;
    let mut values = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        match ca.get(i) {
            Some(v) if v.is_finite() => values.push(v),
            Some(_) => {
                return Err(AutoMlError::pipeline(
                    "load",
                    format!("特征列 {column} 包含非有限数值"),
                ))
            }
            None => {
                return Err(AutoMlError::pipeline(
                    "load",
                    format!("特征列 {column} 包含缺失值"),
                ))
            }
        }
    }
    Ok(values)
}

/// 解析 `data/` 目录下的数据集引用，拒绝路径穿越
pub fn resolve_dataset_path(data_dir: &Path, dataset_ref: &str) -> AutoMlResult<PathBuf> {
    if dataset_ref.is_empty() {
        return Err(AutoMlError::validation("dataset_ref 不能为空"));
    }
    if dataset_ref.contains('/') || dataset_ref.contains('\\') || dataset_ref.contains("..") {
        return Err(AutoMlError::validation(format!(
            "非法的数据集引用: {dataset_ref}"
        )));
    }
    let path = data_dir.join(dataset_ref);
    if !path.is_file() {
        return Err(AutoMlError::dataset_not_found(dataset_ref));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "mixed.csv",
            "age,city,signup,active\n30,Beijing,2024-01-02,true\n41,Shanghai,2024-02-10,false\n28,Beijing,2024-03-05,true\n",
        );

        let dataset = Dataset::load(&path).unwrap();
        assert_eq!(dataset.name(), "mixed");
        assert_eq!(dataset.row_count(), 3);

        let schema = dataset.schema().unwrap();
        assert_eq!(schema.column("age").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(schema.column("city").unwrap().kind, ColumnKind::Text);
        assert_eq!(schema.column("signup").unwrap().kind, ColumnKind::Temporal);
        assert_eq!(schema.column("active").unwrap().kind, ColumnKind::Boolean);
        assert_eq!(schema.column("city").unwrap().unique_count, 2);
        assert_eq!(schema.temporal_columns(), vec!["signup"]);
    }

    #[test]
    fn test_feature_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "nums.csv", "a,b\n1,10\n2,20\n3,30\n");
        let dataset = Dataset::load(&path).unwrap();

        let matrix = dataset
            .feature_matrix(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(matrix.shape(), &[3, 2]);
        assert_eq!(matrix[[1, 1]], 20.0);
    }

    #[test]
    fn test_feature_matrix_rejects_text_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "text.csv", "a,b\n1,x\n2,y\n3,z\n");
        let dataset = Dataset::load(&path).unwrap();

        let err = dataset
            .feature_matrix(&["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(matches!(err, AutoMlError::Pipeline { .. }));
        assert!(err.to_string().contains('b'));
    }

    #[test]
    fn test_feature_matrix_rejects_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "holes.csv", "a,b\n1,10\n2,\n3,30\n");
        let dataset = Dataset::load(&path).unwrap();

        let err = dataset
            .feature_matrix(&["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(matches!(err, AutoMlError::Pipeline { .. }));
    }

    #[test]
    fn test_label_target_from_numeric_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "labels.csv", "x,y\n1,0\n2,1\n3,0\n");
        let dataset = Dataset::load(&path).unwrap();

        let labels = dataset.label_target("y").unwrap();
        assert_eq!(labels, vec!["0", "1", "0"]);
    }

    #[test]
    fn test_resolve_dataset_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "ok.csv", "a\n1\n");

        assert!(resolve_dataset_path(dir.path(), "ok.csv").is_ok());
        assert!(matches!(
            resolve_dataset_path(dir.path(), "../ok.csv"),
            Err(AutoMlError::Validation(_))
        ));
        assert!(matches!(
            resolve_dataset_path(dir.path(), "missing.csv"),
            Err(AutoMlError::DatasetNotFound { .. })
        ));
    }
}
