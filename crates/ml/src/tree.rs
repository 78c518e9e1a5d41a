//! CART决策树
//!
//! 分类使用基尼不纯度，回归使用方差缩减。作为随机森林的基学习器，
//! 支持在每个分裂点对特征子集采样。

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TreeTask {
    Classification { n_classes: usize },
    Regression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// 每个分裂点考察的特征数，None表示全部特征
    pub max_features: Option<usize>,
    pub task: TreeTask,
}

/// 以扁平节点数组存储的决策树，根节点固定为下标0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn fit(
        x: &Array2<f64>,
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = Vec::new();
        build_node(&mut nodes, x, y, samples.to_vec(), 0, params, rng);
        Self { nodes }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn build_node(
    nodes: &mut Vec<Node>,
    x: &Array2<f64>,
    y: &[f64],
    samples: Vec<usize>,
    depth: usize,
    params: &TreeParams,
    rng: &mut StdRng,
) -> usize {
    let leaf_value = leaf_value(y, &samples, params.task);

    let stop = depth >= params.max_depth
        || samples.len() < params.min_samples_split
        || is_pure(y, &samples);
    if stop {
        nodes.push(Node::Leaf { value: leaf_value });
        return nodes.len() - 1;
    }

    match best_split(x, y, &samples, params, rng) {
        None => {
            nodes.push(Node::Leaf { value: leaf_value });
            nodes.len() - 1
        }
        Some((feature, threshold)) => {
            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .copied()
                .partition(|&i| x[[i, feature]] <= threshold);

            // 占位，左右子树构建完成后回填
            let node_index = nodes.len();
            nodes.push(Node::Leaf { value: leaf_value });
            let left = build_node(nodes, x, y, left_samples, depth + 1, params, rng);
            let right = build_node(nodes, x, y, right_samples, depth + 1, params, rng);
            nodes[node_index] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            node_index
        }
    }
}

fn leaf_value(y: &[f64], samples: &[usize], task: TreeTask) -> f64 {
    match task {
        TreeTask::Classification { n_classes } => {
            let mut counts = vec![0usize; n_classes];
            for &i in samples {
                counts[y[i] as usize] += 1;
            }
            // 平票时取下标最小的类，保证确定性
            let mut best = 0;
            for (class, &count) in counts.iter().enumerate() {
                if count > counts[best] {
                    best = class;
                }
            }
            best as f64
        }
        TreeTask::Regression => {
            let sum: f64 = samples.iter().map(|&i| y[i]).sum();
            sum / samples.len().max(1) as f64
        }
    }
}

fn is_pure(y: &[f64], samples: &[usize]) -> bool {
    let first = y[samples[0]];
    samples.iter().all(|&i| y[i] == first)
}

/// 在采样的特征子集上找最优分裂点，返回 (特征, 阈值)
fn best_split(
    x: &Array2<f64>,
    y: &[f64],
    samples: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let n_features = x.ncols();
    let mut features: Vec<usize> = (0..n_features).collect();
    if let Some(m) = params.max_features {
        features.shuffle(rng);
        features.truncate(m.min(n_features));
    }

    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, score)
    for &feature in &features {
        if let Some((threshold, score)) = best_split_for_feature(x, y, samples, feature, params.task)
        {
            let better = match best {
                None => true,
                Some((_, _, best_score)) => score < best_score,
            };
            if better {
                best = Some((feature, threshold, score));
            }
        }
    }
    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// 单个特征上的最优分裂，分数越小越好（加权不纯度）
fn best_split_for_feature(
    x: &Array2<f64>,
    y: &[f64],
    samples: &[usize],
    feature: usize,
    task: TreeTask,
) -> Option<(f64, f64)> {
    let mut order: Vec<usize> = samples.to_vec();
    order.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n = order.len();
    match task {
        TreeTask::Classification { n_classes } => {
            let mut left_counts = vec![0usize; n_classes];
            let mut right_counts = vec![0usize; n_classes];
            for &i in &order {
                right_counts[y[i] as usize] += 1;
            }

            let mut best: Option<(f64, f64)> = None;
            for pos in 0..n - 1 {
                let class = y[order[pos]] as usize;
                left_counts[class] += 1;
                right_counts[class] -= 1;

                let current = x[[order[pos], feature]];
                let next = x[[order[pos + 1], feature]];
                if current == next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                let score = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / n as f64;
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some(((current + next) / 2.0, score));
                }
            }
            best
        }
        TreeTask::Regression => {
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            let mut right_sum: f64 = order.iter().map(|&i| y[i]).sum();
            let mut right_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();

            let mut best: Option<(f64, f64)> = None;
            for pos in 0..n - 1 {
                let value = y[order[pos]];
                left_sum += value;
                left_sq += value * value;
                right_sum -= value;
                right_sq -= value * value;

                let current = x[[order[pos], feature]];
                let next = x[[order[pos + 1], feature]];
                if current == next {
                    continue;
                }

                let n_left = (pos + 1) as f64;
                let n_right = (n - pos - 1) as f64;
                // 左右子集的残差平方和
                let score =
                    (left_sq - left_sum * left_sum / n_left) + (right_sq - right_sum * right_sum / n_right);
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some(((current + next) / 2.0, score));
                }
            }
            best
        }
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for &count in counts {
        let p = count as f64 / total as f64;
        sum += p * p;
    }
    1.0 - sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_classification_tree_separates_classes() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let samples: Vec<usize> = (0..6).collect();
        let params = TreeParams {
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            task: TreeTask::Classification { n_classes: 2 },
        };

        let tree = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        assert_eq!(tree.predict_row(array![0.5].view()), 0.0);
        assert_eq!(tree.predict_row(array![11.5].view()), 1.0);
    }

    #[test]
    fn test_regression_tree_fits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = vec![5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let samples: Vec<usize> = (0..6).collect();
        let params = TreeParams {
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            task: TreeTask::Regression,
        };

        let tree = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        assert!((tree.predict_row(array![2.0].view()) - 5.0).abs() < 1e-9);
        assert!((tree.predict_row(array![11.0].view()) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pure_node_becomes_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = vec![1.0, 1.0, 1.0];
        let samples: Vec<usize> = (0..3).collect();
        let params = TreeParams {
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            task: TreeTask::Classification { n_classes: 2 },
        };

        let tree = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_constant_features_yield_leaf() {
        let x = array![[7.0], [7.0], [7.0], [7.0]];
        let y = vec![0.0, 1.0, 0.0, 1.0];
        let samples: Vec<usize> = (0..4).collect();
        let params = TreeParams {
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            task: TreeTask::Classification { n_classes: 2 },
        };

        let tree = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let x = array![
            [1.0, 3.0],
            [2.0, 1.0],
            [3.0, 4.0],
            [10.0, 1.5],
            [11.0, 3.5],
            [12.0, 2.0]
        ];
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let samples: Vec<usize> = (0..6).collect();
        let params = TreeParams {
            max_depth: 8,
            min_samples_split: 2,
            max_features: Some(1),
            task: TreeTask::Classification { n_classes: 2 },
        };

        let a = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        let b = DecisionTree::fit(&x, &y, &samples, &params, &mut rng());
        let json_a = serde_json::to_string(&a).unwrap();
        let json_b = serde_json::to_string(&b).unwrap();
        assert_eq!(json_a, json_b);
    }
}
