//! 已训练模型的序列化形式与统一预测入口

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use automl_domain::ProblemType;
use automl_errors::{AutoMlError, AutoMlResult};

use crate::forest::RandomForest;
use crate::kmeans::KMeans;

/// 类别标签编码器，类别按字典序排定下标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(labels: &[String]) -> (Self, Vec<usize>) {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        let encoded = labels
            .iter()
            .map(|label| {
                classes
                    .binary_search(label)
                    .expect("label must be present after fit")
            })
            .collect();
        (Self { classes }, encoded)
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn decode(&self, index: usize) -> &str {
        &self.classes[index]
    }
}

/// 模型产物中持久化的已训练模型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrainedModel {
    #[serde(rename = "classification")]
    Classifier {
        forest: RandomForest,
        labels: LabelEncoder,
    },
    #[serde(rename = "regression")]
    Regressor { forest: RandomForest },
    #[serde(rename = "clustering")]
    Clusterer { kmeans: KMeans },
}

impl TrainedModel {
    pub fn problem_type(&self) -> ProblemType {
        match self {
            TrainedModel::Classifier { .. } => ProblemType::Classification,
            TrainedModel::Regressor { .. } => ProblemType::Regression,
            TrainedModel::Clusterer { .. } => ProblemType::Clustering,
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            TrainedModel::Classifier { .. } => "RandomForestClassifier",
            TrainedModel::Regressor { .. } => "RandomForestRegressor",
            TrainedModel::Clusterer { .. } => "KMeans",
        }
    }

    pub fn expected_features(&self) -> usize {
        match self {
            TrainedModel::Classifier { forest, .. } | TrainedModel::Regressor { forest } => {
                forest.n_features()
            }
            TrainedModel::Clusterer { kmeans } => kmeans.centroids.ncols(),
        }
    }

    /// 统一预测: 分类返回标签（数值标签还原为数值），
    /// 回归返回浮点值，聚类返回簇编号
    pub fn predict(&self, x: &Array2<f64>) -> AutoMlResult<Vec<serde_json::Value>> {
        if x.ncols() != self.expected_features() {
            return Err(AutoMlError::validation(format!(
                "特征数不匹配: 期望 {}, 实际 {}",
                self.expected_features(),
                x.ncols()
            )));
        }
        let values = match self {
            TrainedModel::Classifier { forest, labels } => forest
                .predict_class(x)
                .into_iter()
                .map(|class| label_to_value(labels.decode(class)))
                .collect(),
            TrainedModel::Regressor { forest } => forest
                .predict_value(x)
                .into_iter()
                .map(|v| serde_json::json!(v))
                .collect(),
            TrainedModel::Clusterer { kmeans } => kmeans
                .predict(x)
                .into_iter()
                .map(|cluster| serde_json::json!(cluster))
                .collect(),
        };
        Ok(values)
    }
}

/// 数值型标签在输出时还原为JSON数值，其余保持字符串
fn label_to_value(label: &str) -> serde_json::Value {
    if let Ok(v) = label.parse::<i64>() {
        return serde_json::json!(v);
    }
    if let Ok(v) = label.parse::<f64>() {
        return serde_json::json!(v);
    }
    serde_json::json!(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParams;
    use ndarray::array;

    #[test]
    fn test_label_encoder_round_trip() {
        let labels = vec![
            "yes".to_string(),
            "no".to_string(),
            "yes".to_string(),
            "maybe".to_string(),
        ];
        let (encoder, encoded) = LabelEncoder::fit(&labels);
        assert_eq!(encoder.n_classes(), 3);
        for (label, &code) in labels.iter().zip(encoded.iter()) {
            assert_eq!(encoder.decode(code), label);
        }
    }

    #[test]
    fn test_classifier_predicts_original_labels() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let labels = vec![
            "low".to_string(),
            "low".to_string(),
            "low".to_string(),
            "high".to_string(),
            "high".to_string(),
            "high".to_string(),
        ];
        let (encoder, encoded) = LabelEncoder::fit(&labels);
        let forest = RandomForest::fit_classifier(
            &x,
            &encoded,
            encoder.n_classes(),
            &ForestParams {
                n_estimators: 25,
                ..ForestParams::default()
            },
        );
        let model = TrainedModel::Classifier {
            forest,
            labels: encoder,
        };

        let predictions = model.predict(&array![[1.0], [11.0]]).unwrap();
        assert_eq!(predictions, vec![serde_json::json!("low"), serde_json::json!("high")]);
    }

    #[test]
    fn test_numeric_labels_come_back_as_numbers() {
        assert_eq!(label_to_value("1"), serde_json::json!(1));
        assert_eq!(label_to_value("2.5"), serde_json::json!(2.5));
        assert_eq!(label_to_value("spam"), serde_json::json!("spam"));
    }

    #[test]
    fn test_feature_count_mismatch_is_rejected() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let (encoder, encoded) = LabelEncoder::fit(&[
            "a".to_string(),
            "a".to_string(),
            "b".to_string(),
            "b".to_string(),
        ]);
        let forest = RandomForest::fit_classifier(
            &x,
            &encoded,
            encoder.n_classes(),
            &ForestParams {
                n_estimators: 5,
                ..ForestParams::default()
            },
        );
        let model = TrainedModel::Classifier {
            forest,
            labels: encoder,
        };

        let err = model.predict(&array![[1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));
    }
}
