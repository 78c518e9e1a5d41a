//! 问题类型推荐引擎
//!
//! 纯函数：输入数据集schema与可选目标列，输出有序的候选问题类型
//! 与解释文字。判定过程完全确定，阈值是契约值。

use automl_domain::{ProblemType, Recommendation};

use crate::dataset::{ColumnKind, DatasetSchema};

/// 连续型/类别型判定阈值，默认值 0.05 与 20 为契约值
#[derive(Debug, Clone)]
pub struct RecommendationRules {
    pub continuous_unique_ratio: f64,
    pub continuous_min_rows: usize,
}

impl Default for RecommendationRules {
    fn default() -> Self {
        Self {
            continuous_unique_ratio: 0.05,
            continuous_min_rows: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetCharacter {
    Continuous,
    Categorical,
}

/// 分析目标列特征
///
/// 数值列在唯一值足够多（超过行数的给定占比）且样本量足够时
/// 视为连续型，否则视为类别型；非数值列一律视为类别型。
fn analyze_target(
    schema: &DatasetSchema,
    target: &str,
    rules: &RecommendationRules,
) -> Option<TargetCharacter> {
    let column = schema.column(target)?;
    match column.kind {
        ColumnKind::Numeric => {
            let threshold = rules.continuous_unique_ratio * schema.row_count as f64;
            if column.unique_count as f64 > threshold && schema.row_count > rules.continuous_min_rows
            {
                Some(TargetCharacter::Continuous)
            } else {
                Some(TargetCharacter::Categorical)
            }
        }
        _ => Some(TargetCharacter::Categorical),
    }
}

/// 推荐适合该数据集的问题类型
pub fn recommend(
    schema: &DatasetSchema,
    target_column: Option<&str>,
    rules: &RecommendationRules,
) -> Recommendation {
    let mut candidates: Vec<ProblemType> = Vec::new();
    let mut rationale = String::new();

    let known_target = target_column.filter(|t| schema.has_column(t));

    match known_target {
        Some(target) => match analyze_target(schema, target, rules) {
            Some(TargetCharacter::Categorical) => {
                candidates.push(ProblemType::Classification);
                rationale.push_str(&format!(
                    "目标列 '{target}' 呈类别型（如 是/否、A/B/C），\
                     推荐使用分类（Classification）模型，\
                     将数据预测为预定义类别之一。"
                ));
            }
            Some(TargetCharacter::Continuous) => {
                candidates.push(ProblemType::Regression);
                rationale.push_str(&format!(
                    "目标列 '{target}' 呈连续数值型（如价格、温度），\
                     推荐使用回归（Regression）模型来预测连续数值。"
                ));
            }
            None => {
                rationale.push_str("目标列分析未得出结论，推荐通用模型类型。");
            }
        },
        None => {
            rationale.push_str(
                "未指定目标列或目标列不在数据集中。\
                 这种情况下可以考虑挖掘数据内部结构的聚类分析（Clustering），\
                 或基于行为的推荐系统（Recommendation）。",
            );
            candidates.push(ProblemType::Clustering);
            candidates.push(ProblemType::Recommendation);
        }
    }

    // 检测到时间列时追加时序预测，与上面的判定叠加而非互斥
    let temporal = schema.temporal_columns();
    if !temporal.is_empty() {
        candidates.push(ProblemType::TimeSeries);
        rationale.push_str(&format!(
            "\n数据中包含日期/时间信息（{}），\
             也可以考虑预测时间走势的时序（TimeSeries）模型。",
            temporal.join(", ")
        ));
    }

    if candidates.is_empty() {
        candidates.push(ProblemType::GeneralPurpose);
        rationale = "推荐用于数据分析的通用模型类型。".to_string();
    }

    Recommendation {
        candidates,
        rationale,
    }
}
