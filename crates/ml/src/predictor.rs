//! 批量预测
//!
//! 记录的列必须覆盖产物记录的特征列表（多余的列忽略，顺序
//! 按特征列表重排）；任何一条记录缺少必需特征时整批失败，
//! 不返回部分结果。

use ndarray::Array2;
use serde_json::{Map, Value};

use automl_errors::{AutoMlError, AutoMlResult};

use crate::artifacts::ArtifactDocument;

/// 对一批记录执行预测，保持输入顺序
pub fn predict_records(
    document: &ArtifactDocument,
    records: &[Map<String, Value>],
) -> AutoMlResult<Vec<Value>> {
    if records.is_empty() {
        return Err(AutoMlError::validation("预测记录列表不能为空"));
    }

    let features = &document.meta.feature_columns;
    let mut matrix = Array2::<f64>::zeros((records.len(), features.len()));
    for (i, record) in records.iter().enumerate() {
        for (j, feature) in features.iter().enumerate() {
            let value = record.get(feature).ok_or_else(|| {
                AutoMlError::validation(format!("第 {i} 条记录缺少特征: {feature}"))
            })?;
            matrix[[i, j]] = numeric_value(value).ok_or_else(|| {
                AutoMlError::validation(format!(
                    "第 {i} 条记录的特征 {feature} 不是数值: {value}"
                ))
            })?;
        }
    }

    document.model.predict(&matrix)
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
