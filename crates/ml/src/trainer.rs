//! 模型训练流水线
//!
//! 校验在任何计算之前完成；训练/测试划分与各算法的随机性
//! 全部由固定种子驱动，同样的输入必然得到同样的产物。

use std::collections::BTreeMap;

use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use automl_domain::{ModelType, ProblemType, Recommendation};
use automl_errors::{AutoMlError, AutoMlResult};

use crate::dataset::Dataset;
use crate::forest::{ForestParams, RandomForest};
use crate::kmeans::{silhouette_score, KMeans, KMeansParams};
use crate::model::{LabelEncoder, TrainedModel};

/// 保留作测试集的比例，契约值
const TEST_FRACTION: f64 = 0.2;
/// 划分与拟合使用的固定随机种子，契约值
const SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: TrainedModel,
    pub problem_type: ProblemType,
    pub algorithm: String,
    pub target_column: Option<String>,
    pub feature_columns: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub explanation: String,
}

/// 把请求的模型类型解析为可训练的问题类型
///
/// `auto` 取推荐候选中第一个可训练的类型；显式指定的类型
/// 必须落在 {Classification, Regression, Clustering} 之内。
pub fn resolve_problem_type(
    requested: ModelType,
    recommendation: &Recommendation,
) -> AutoMlResult<ProblemType> {
    match requested {
        ModelType::Classification => Ok(ProblemType::Classification),
        ModelType::Regression => Ok(ProblemType::Regression),
        ModelType::Clustering => Ok(ProblemType::Clustering),
        ModelType::Auto => recommendation
            .candidates
            .iter()
            .copied()
            .find(ProblemType::is_trainable)
            .ok_or_else(|| {
                AutoMlError::UnsupportedModelType(format!(
                    "自动推荐未产生可训练的问题类型: {:?}",
                    recommendation.candidates
                ))
            }),
    }
}

/// 确定特征列: 显式列表必须存在且不含目标列，缺省为目标列以外的全部列
pub fn resolve_features(
    dataset: &Dataset,
    target: Option<&str>,
    requested: Option<&[String]>,
) -> AutoMlResult<Vec<String>> {
    let features = match requested {
        Some(features) => {
            if features.is_empty() {
                return Err(AutoMlError::validation("特征列表不能为空"));
            }
            for feature in features {
                if !dataset.has_column(feature) {
                    return Err(AutoMlError::validation(format!("特征列不存在: {feature}")));
                }
                if Some(feature.as_str()) == target {
                    return Err(AutoMlError::validation(format!(
                        "特征列不能包含目标列: {feature}"
                    )));
                }
            }
            features.to_vec()
        }
        None => dataset
            .column_names()
            .into_iter()
            .filter(|name| Some(name.as_str()) != target)
            .collect(),
    };
    if features.is_empty() {
        return Err(AutoMlError::validation("没有可用的特征列"));
    }
    Ok(features)
}

/// 确定性的训练/测试索引划分，返回 (训练集, 测试集)
fn train_test_split(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    (train, test)
}

/// 训练指定类型的模型并在保留集上评估
///
/// 产物落盘不在这里发生: 指标计算成功之后由调用方写入产物，
/// 保证失败的训练不会留下半成品文件。
pub fn train(
    dataset: &Dataset,
    problem_type: ProblemType,
    target: Option<&str>,
    features: &[String],
) -> AutoMlResult<TrainOutcome> {
    if !problem_type.is_trainable() {
        return Err(AutoMlError::UnsupportedModelType(format!(
            "{problem_type:?}"
        )));
    }

    let supervised = matches!(
        problem_type,
        ProblemType::Classification | ProblemType::Regression
    );
    let target = match (supervised, target) {
        (true, None) => {
            return Err(AutoMlError::validation(
                "监督学习模型必须指定目标列",
            ))
        }
        (true, Some(t)) => {
            if !dataset.has_column(t) {
                return Err(AutoMlError::validation(format!("目标列不存在: {t}")));
            }
            Some(t)
        }
        (false, _) => None,
    };

    let x = dataset.feature_matrix(features)?;
    let n = x.nrows();

    let (model, metrics, explanation) = match problem_type {
        ProblemType::Classification => {
            let labels = dataset.label_target(target.expect("supervised"))?;
            let (encoder, encoded) = LabelEncoder::fit(&labels);
            require_rows_for_split(n)?;
            let (train_idx, test_idx) = train_test_split(n, TEST_FRACTION, SPLIT_SEED);

            let x_train = x.select(Axis(0), &train_idx);
            let y_train: Vec<usize> = train_idx.iter().map(|&i| encoded[i]).collect();
            let forest = RandomForest::fit_classifier(
                &x_train,
                &y_train,
                encoder.n_classes(),
                &ForestParams::default(),
            );

            let x_test = x.select(Axis(0), &test_idx);
            let predictions = forest.predict_class(&x_test);
            let correct = predictions
                .iter()
                .zip(test_idx.iter())
                .filter(|(&predicted, &i)| predicted == encoded[i])
                .count();
            let accuracy = correct as f64 / test_idx.len() as f64;

            let mut metrics = BTreeMap::new();
            metrics.insert("accuracy".to_string(), accuracy);
            (
                TrainedModel::Classifier {
                    forest,
                    labels: encoder,
                },
                metrics,
                "分类模型训练成功。准确率（accuracy）表示模型在保留测试集上预测正确的样本比例。"
                    .to_string(),
            )
        }
        ProblemType::Regression => {
            let y = dataset.numeric_target(target.expect("supervised"))?;
            require_rows_for_split(n)?;
            let (train_idx, test_idx) = train_test_split(n, TEST_FRACTION, SPLIT_SEED);

            let x_train = x.select(Axis(0), &train_idx);
            let y_train: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();
            let forest = RandomForest::fit_regressor(&x_train, &y_train, &ForestParams::default());

            let x_test = x.select(Axis(0), &test_idx);
            let predictions = forest.predict_value(&x_test);
            let mse = predictions
                .iter()
                .zip(test_idx.iter())
                .map(|(&predicted, &i)| (predicted - y[i]) * (predicted - y[i]))
                .sum::<f64>()
                / test_idx.len() as f64;

            let mut metrics = BTreeMap::new();
            metrics.insert("mse".to_string(), mse);
            (
                TrainedModel::Regressor { forest },
                metrics,
                "回归模型训练成功。MSE（均方误差）反映预测值与真实值之间的平均平方偏差，越小越好。"
                    .to_string(),
            )
        }
        ProblemType::Clustering => {
            let params = KMeansParams::default();
            let (kmeans, labels) = KMeans::fit(&x, &params)?;
            let score = silhouette_score(&x, &labels, params.k)?;

            let mut metrics = BTreeMap::new();
            metrics.insert("silhouette_score".to_string(), score);
            (
                TrainedModel::Clusterer { kmeans },
                metrics,
                "聚类模型训练成功。轮廓系数（silhouette score）衡量各簇分离的清晰程度，越接近1越好。"
                    .to_string(),
            )
        }
        _ => unreachable!("is_trainable checked above"),
    };

    tracing::info!(
        dataset = dataset.name(),
        problem_type = ?problem_type,
        algorithm = model.algorithm(),
        "模型训练完成"
    );

    Ok(TrainOutcome {
        algorithm: model.algorithm().to_string(),
        problem_type,
        target_column: target.map(|t| t.to_string()),
        feature_columns: features.to_vec(),
        metrics,
        explanation,
        model,
    })
}

fn require_rows_for_split(n: usize) -> AutoMlResult<()> {
    if n < 2 {
        return Err(AutoMlError::validation(
            "数据行数不足，无法划分训练集与测试集",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn binary_dataset(dir: &Path) -> Dataset {
        // 两个线性可分的簇
        let mut csv = String::from("x1,x2,label\n");
        for i in 0..20 {
            csv.push_str(&format!("{}.0,{}.5,0\n", i % 5, i % 4));
        }
        for i in 0..20 {
            csv.push_str(&format!("{}.0,{}.5,1\n", 50 + i % 5, 50 + i % 4));
        }
        let path = write_csv(dir, "binary.csv", &csv);
        Dataset::load(&path).unwrap()
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = train_test_split(100, TEST_FRACTION, SPLIT_SEED);
        let (train_b, test_b) = train_test_split(100, TEST_FRACTION, SPLIT_SEED);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 20);
        assert_eq!(train_a.len(), 80);

        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_tiny_dataset_keeps_nonempty_train() {
        let (train, test) = train_test_split(2, TEST_FRACTION, SPLIT_SEED);
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 1);
    }

    #[test]
    fn test_classification_training_reports_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = binary_dataset(dir.path());
        let features = resolve_features(&dataset, Some("label"), None).unwrap();
        assert_eq!(features, vec!["x1".to_string(), "x2".to_string()]);

        let outcome = train(&dataset, ProblemType::Classification, Some("label"), &features)
            .unwrap();
        assert_eq!(outcome.algorithm, "RandomForestClassifier");
        let accuracy = outcome.metrics["accuracy"];
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
        assert!(!outcome.explanation.is_empty());
    }

    #[test]
    fn test_regression_training_reports_mse() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("x,y\n");
        for i in 0..50 {
            csv.push_str(&format!("{i}.0,{}\n", 2 * i));
        }
        let path = write_csv(dir.path(), "linear.csv", &csv);
        let dataset = Dataset::load(&path).unwrap();

        let outcome = train(
            &dataset,
            ProblemType::Regression,
            Some("y"),
            &["x".to_string()],
        )
        .unwrap();
        assert_eq!(outcome.algorithm, "RandomForestRegressor");
        assert!(outcome.metrics.contains_key("mse"));
    }

    #[test]
    fn test_clustering_training_reports_silhouette() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("a,b\n");
        for i in 0..10 {
            csv.push_str(&format!("{}.1,{}.2\n", i % 3, i % 3));
        }
        for i in 0..10 {
            csv.push_str(&format!("{}.1,{}.2\n", 50 + i % 3, 50 + i % 3));
        }
        for i in 0..10 {
            csv.push_str(&format!("{}.1,{}.2\n", 100 + i % 3, i % 3));
        }
        let path = write_csv(dir.path(), "blobs.csv", &csv);
        let dataset = Dataset::load(&path).unwrap();

        let outcome = train(&dataset, ProblemType::Clustering, None, &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(outcome.algorithm, "KMeans");
        assert!(outcome.metrics["silhouette_score"] > 0.5);
        assert!(outcome.target_column.is_none());
    }

    #[test]
    fn test_supervised_without_target_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = binary_dataset(dir.path());
        let err = train(
            &dataset,
            ProblemType::Classification,
            None,
            &["x1".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));
    }

    #[test]
    fn test_unknown_feature_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = binary_dataset(dir.path());
        let err = resolve_features(&dataset, Some("label"), Some(&["ghost".to_string()]))
            .unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));
    }

    #[test]
    fn test_target_in_features_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = binary_dataset(dir.path());
        let err = resolve_features(
            &dataset,
            Some("label"),
            Some(&["x1".to_string(), "label".to_string()]),
        )
        .unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));
    }

    #[test]
    fn test_untrainable_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = binary_dataset(dir.path());
        let err = train(
            &dataset,
            ProblemType::TimeSeries,
            Some("label"),
            &["x1".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, AutoMlError::UnsupportedModelType(_)));
    }

    #[test]
    fn test_resolve_auto_prefers_first_trainable_candidate() {
        let recommendation = Recommendation {
            candidates: vec![ProblemType::TimeSeries, ProblemType::Regression],
            rationale: "test".to_string(),
        };
        let resolved = resolve_problem_type(ModelType::Auto, &recommendation).unwrap();
        assert_eq!(resolved, ProblemType::Regression);

        let unsupervised = Recommendation {
            candidates: vec![ProblemType::Clustering, ProblemType::Recommendation],
            rationale: "test".to_string(),
        };
        let resolved = resolve_problem_type(ModelType::Auto, &unsupervised).unwrap();
        assert_eq!(resolved, ProblemType::Clustering);

        let hopeless = Recommendation {
            candidates: vec![ProblemType::GeneralPurpose],
            rationale: "test".to_string(),
        };
        assert!(matches!(
            resolve_problem_type(ModelType::Auto, &hopeless),
            Err(AutoMlError::UnsupportedModelType(_))
        ));
    }
}
