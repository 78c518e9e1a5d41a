//! k-means聚类与轮廓系数
//!
//! Lloyd迭代，固定k与种子；多次随机重启后取惯性最小的一次，
//! 空簇以离当前质心最远的样本点补位，保证每个簇非空且结果确定。

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use automl_errors::{AutoMlError, AutoMlResult};

#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 3,
            n_init: 10,
            max_iter: 300,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub centroids: Array2<f64>,
}

impl KMeans {
    /// 训练并返回 (模型, 每个样本的簇标签)
    pub fn fit(x: &Array2<f64>, params: &KMeansParams) -> AutoMlResult<(Self, Vec<usize>)> {
        let n = x.nrows();
        if n < params.k {
            return Err(AutoMlError::pipeline(
                "fit",
                format!("样本数 {n} 少于簇数 {}", params.k),
            ));
        }

        let mut best: Option<(Array2<f64>, Vec<usize>, f64)> = None;
        for run in 0..params.n_init {
            let seed = params.seed.wrapping_add(run as u64);
            let (centroids, labels, inertia) = lloyd(x, params, seed);
            if best.as_ref().map_or(true, |(_, _, b)| inertia < *b) {
                best = Some((centroids, labels, inertia));
            }
        }

        let (centroids, labels, _) = best.expect("n_init must be positive");
        Ok((Self { centroids }, labels))
    }

    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        x.rows()
            .into_iter()
            .map(|row| nearest_centroid(&self.centroids, row))
            .collect()
    }
}

fn lloyd(x: &Array2<f64>, params: &KMeansParams, seed: u64) -> (Array2<f64>, Vec<usize>, f64) {
    let n = x.nrows();
    let d = x.ncols();
    let mut rng = StdRng::seed_from_u64(seed);

    // 随机选取k个互不相同的样本点作为初始质心
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let mut centroids = Array2::<f64>::zeros((params.k, d));
    for (c, &i) in indices.iter().take(params.k).enumerate() {
        centroids.row_mut(c).assign(&x.row(i));
    }

    let mut labels = vec![0usize; n];
    for _ in 0..params.max_iter {
        let new_labels: Vec<usize> = x
            .rows()
            .into_iter()
            .map(|row| nearest_centroid(&centroids, row))
            .collect();

        let mut counts = vec![0usize; params.k];
        let mut sums = Array2::<f64>::zeros((params.k, d));
        for (i, &label) in new_labels.iter().enumerate() {
            counts[label] += 1;
            let mut sum_row = sums.row_mut(label);
            sum_row += &x.row(i);
        }
        for c in 0..params.k {
            if counts[c] == 0 {
                // 空簇: 用离自身质心最远的样本点补位
                let farthest = (0..n)
                    .max_by(|&a, &b| {
                        let da = squared_distance(x.row(a), centroids.row(new_labels[a]));
                        let db = squared_distance(x.row(b), centroids.row(new_labels[b]));
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids.row_mut(c).assign(&x.row(farthest));
            } else {
                let mut row = centroids.row_mut(c);
                row.assign(&sums.row(c));
                row /= counts[c] as f64;
            }
        }

        let converged = new_labels == labels;
        labels = new_labels;
        if converged {
            break;
        }
    }

    let inertia: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| squared_distance(x.row(i), centroids.row(label)))
        .sum();
    (centroids, labels, inertia)
}

fn nearest_centroid(centroids: &Array2<f64>, row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(row, centroid);
        if distance < best_distance {
            best = c;
            best_distance = distance;
        }
    }
    best
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// 全量样本上的轮廓系数
///
/// s(i) = (b - a) / max(a, b)，a为样本到同簇其他点的平均距离，
/// b为到最近异簇的平均距离；单点簇的s记为0。
pub fn silhouette_score(x: &Array2<f64>, labels: &[usize], k: usize) -> AutoMlResult<f64> {
    let n = x.nrows();
    if n != labels.len() {
        return Err(AutoMlError::pipeline("evaluate", "标签数与样本数不一致"));
    }
    let mut cluster_sizes = vec![0usize; k];
    for &label in labels {
        cluster_sizes[label] += 1;
    }
    if cluster_sizes.iter().filter(|&&size| size > 0).count() < 2 {
        return Err(AutoMlError::pipeline(
            "evaluate",
            "轮廓系数至少需要两个非空簇",
        ));
    }

    let mut total = 0.0;
    for i in 0..n {
        // 样本i到每个簇的距离和
        let mut distance_sums = vec![0.0f64; k];
        for j in 0..n {
            if i == j {
                continue;
            }
            let distance = squared_distance(x.row(i), x.row(j)).sqrt();
            distance_sums[labels[j]] += distance;
        }

        let own = labels[i];
        if cluster_sizes[own] <= 1 {
            continue; // s(i) = 0
        }
        let a = distance_sums[own] / (cluster_sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && cluster_sizes[c] > 0)
            .map(|c| distance_sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let s = (b - a) / a.max(b);
        total += s;
    }
    Ok(total / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [10.0, 10.0],
            [10.2, 9.9],
            [9.8, 10.1],
            [20.0, 0.0],
            [20.1, 0.2],
            [19.9, 0.1]
        ]
    }

    #[test]
    fn test_fit_groups_blobs_together() {
        let x = three_blobs();
        let (_, labels) = KMeans::fit(&x, &KMeansParams::default()).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[6], labels[8]);
        assert_ne!(labels[0], labels[3]);
        assert_ne!(labels[0], labels[6]);
        assert_ne!(labels[3], labels[6]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = three_blobs();
        let (model_a, labels_a) = KMeans::fit(&x, &KMeansParams::default()).unwrap();
        let (model_b, labels_b) = KMeans::fit(&x, &KMeansParams::default()).unwrap();
        assert_eq!(labels_a, labels_b);
        assert_eq!(model_a.centroids, model_b.centroids);
    }

    #[test]
    fn test_predict_assigns_to_nearest_blob() {
        let x = three_blobs();
        let (model, labels) = KMeans::fit(&x, &KMeansParams::default()).unwrap();
        let assigned = model.predict(&array![[0.1, 0.1], [10.1, 10.0]]);
        assert_eq!(assigned[0], labels[0]);
        assert_eq!(assigned[1], labels[3]);
    }

    #[test]
    fn test_too_few_samples_is_pipeline_error() {
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let err = KMeans::fit(&x, &KMeansParams::default()).unwrap_err();
        assert!(matches!(err, AutoMlError::Pipeline { .. }));
    }

    #[test]
    fn test_silhouette_of_well_separated_blobs_is_high() {
        let x = three_blobs();
        let (_, labels) = KMeans::fit(&x, &KMeansParams::default()).unwrap();
        let score = silhouette_score(&x, &labels, 3).unwrap();
        assert!(score > 0.8, "score = {score}");
    }

    #[test]
    fn test_silhouette_requires_two_clusters() {
        let x = array![[0.0], [1.0], [2.0]];
        let labels = vec![0, 0, 0];
        assert!(silhouette_score(&x, &labels, 3).is_err());
    }
}
