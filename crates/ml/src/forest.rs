//! 随机森林
//!
//! 对自助采样的样本集训练一组CART树: 分类树在每个分裂点
//! 采样 sqrt(特征数) 个特征，回归树使用全部特征，与常见
//! 树集成实现的默认行为一致。种子固定以保证可复现。

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::tree::{DecisionTree, TreeParams, TreeTask};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 16,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    task: TreeTask,
    n_features: usize,
}

impl RandomForest {
    pub fn fit_classifier(
        x: &Array2<f64>,
        classes: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Self {
        let y: Vec<f64> = classes.iter().map(|&c| c as f64).collect();
        let max_features = ((x.ncols() as f64).sqrt().ceil() as usize).max(1);
        Self::fit(
            x,
            &y,
            TreeTask::Classification { n_classes },
            Some(max_features),
            params,
        )
    }

    pub fn fit_regressor(x: &Array2<f64>, y: &[f64], params: &ForestParams) -> Self {
        Self::fit(x, y, TreeTask::Regression, None, params)
    }

    fn fit(
        x: &Array2<f64>,
        y: &[f64],
        task: TreeTask,
        max_features: Option<usize>,
        params: &ForestParams,
    ) -> Self {
        let n = x.nrows();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features,
            task,
        };

        let mut trees = Vec::with_capacity(params.n_estimators);
        for t in 0..params.n_estimators {
            // 每棵树使用独立但确定的随机序列
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
            let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(DecisionTree::fit(x, y, &samples, &tree_params, &mut rng));
        }

        Self {
            trees,
            task,
            n_features: x.ncols(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn task(&self) -> TreeTask {
        self.task
    }

    /// 多数投票，平票时取下标最小的类
    pub fn predict_class(&self, x: &Array2<f64>) -> Vec<usize> {
        let n_classes = match self.task {
            TreeTask::Classification { n_classes } => n_classes,
            TreeTask::Regression => 0,
        };
        let mut predictions = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let mut votes = vec![0usize; n_classes];
            for tree in &self.trees {
                votes[tree.predict_row(row) as usize] += 1;
            }
            let mut best = 0;
            for (class, &count) in votes.iter().enumerate() {
                if count > votes[best] {
                    best = class;
                }
            }
            predictions.push(best);
        }
        predictions
    }

    /// 各树预测值的均值
    pub fn predict_value(&self, x: &Array2<f64>) -> Vec<f64> {
        let mut predictions = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let sum: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
            predictions.push(sum / self.trees.len() as f64);
        }
        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 25,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_classifier_on_separable_data() {
        let x = array![
            [0.0, 0.1],
            [0.5, 0.2],
            [1.0, 0.0],
            [0.2, 0.4],
            [10.0, 9.8],
            [10.5, 10.2],
            [11.0, 10.0],
            [10.2, 10.4]
        ];
        let classes = vec![0, 0, 0, 0, 1, 1, 1, 1];

        let forest = RandomForest::fit_classifier(&x, &classes, 2, &small_params());
        let predictions = forest.predict_class(&x);
        assert_eq!(predictions, classes);

        let unseen = array![[0.3, 0.3], [10.3, 10.1]];
        assert_eq!(forest.predict_class(&unseen), vec![0, 1]);
    }

    #[test]
    fn test_regressor_approximates_linear_target() {
        let n = 40;
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let v = i as f64;
            rows.push([v]);
            y.push(3.0 * v);
        }
        let x = Array2::from_shape_vec((n, 1), rows.into_iter().flatten().collect()).unwrap();

        let forest = RandomForest::fit_regressor(&x, &y, &small_params());
        let predictions = forest.predict_value(&x);
        // 树模型在训练区间内部应当接近目标值
        let mid = predictions[n / 2];
        assert!((mid - 3.0 * (n / 2) as f64).abs() < 10.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let classes = vec![0, 0, 0, 1, 1, 1];

        let a = RandomForest::fit_classifier(&x, &classes, 2, &small_params());
        let b = RandomForest::fit_classifier(&x, &classes, 2, &small_params());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let classes = vec![0, 0, 0, 1, 1, 1];
        let forest = RandomForest::fit_classifier(&x, &classes, 2, &small_params());

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(forest.predict_class(&x), restored.predict_class(&x));
    }
}
