//! Isolation Forest over dense feature vectors.
//!
//! Anomalies are few and different, so random axis-aligned splits isolate
//! them in fewer steps than normal points. The anomaly score of `x` is
//! `2^(-E[h(x)] / c(ψ))` where `h` is the path length in one tree and `ψ`
//! the per-tree subsample size.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

const EULER_MASCHERONI: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub sample_size: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            sample_size: 256,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    dims: usize,
}

impl IsolationForest {
    /// Train `params.n_trees` trees. Identical seeds and data produce
    /// identical forests.
    pub fn fit(samples: &[Vec<f64>], params: ForestParams, seed: u64) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(AnomalyError::InvalidParams("n_trees must be positive".to_string()));
        }
        if params.sample_size < 2 {
            return Err(AnomalyError::InvalidParams(
                "sample_size must be at least 2".to_string(),
            ));
        }
        if samples.len() < 2 {
            return Err(AnomalyError::InvalidData(format!(
                "need at least 2 samples, got {}",
                samples.len()
            )));
        }
        let dims = samples[0].len();
        if dims == 0 || samples.iter().any(|s| s.len() != dims) {
            return Err(AnomalyError::InvalidData(
                "samples must share a non-zero dimension".to_string(),
            ));
        }
        if samples.iter().flatten().any(|x| !x.is_finite()) {
            return Err(AnomalyError::InvalidData("samples contain non-finite values".to_string()));
        }

        let sample_size = params.sample_size.min(samples.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..params.n_trees)
            .map(|_| {
                let rows: Vec<&[f64]> = index::sample(&mut rng, samples.len(), sample_size)
                    .into_iter()
                    .map(|i| samples[i].as_slice())
                    .collect();
                build(&rows, 0, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            dims,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Subsample size ψ actually used per tree.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Anomaly score in (0, 1].
    pub fn score(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.dims {
            return Err(AnomalyError::InvalidData(format!(
                "expected {} features, got {}",
                self.dims,
                x.len()
            )));
        }
        let total: f64 = self.trees.iter().map(|tree| path_length(tree, x, 0)).sum();
        let mean = total / self.trees.len() as f64;
        Ok(2f64.powf(-mean / average_path_length(self.sample_size)))
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * harmonic(n - 1.0) - 2.0 * (n - 1.0) / n
        }
    }
}

fn harmonic(i: f64) -> f64 {
    i.ln() + EULER_MASCHERONI
}

fn build(rows: &[&[f64]], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let dims = rows[0].len();
    let spread: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|feature| {
            let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r[feature]), hi.max(r[feature]))
            });
            (max > min).then_some((feature, min, max))
        })
        .collect();

    if spread.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = spread[rng.random_range(0..spread.len())];
    let mut threshold = rng.random_range(min..max);
    if threshold <= min {
        threshold = min + (max - min) / 2.0;
    }

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        rows.iter().partition(|r| r[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(&left, depth + 1, height_limit, rng)),
        right: Box::new(build(&right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, x: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if x[*feature] < *threshold {
                path_length(left, x, depth + 1)
            } else {
                path_length(right, x, depth + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec![rng.random_range(4.0..6.0), rng.random_range(4.0..6.0)])
            .collect()
    }

    #[test]
    fn c_n_edge_values() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244).abs() < 0.01, "c(256) = {c256}");
    }

    #[test]
    fn outliers_score_higher_than_inliers() {
        let mut data = cluster(300, 7);
        data.push(vec![40.0, 40.0]);
        let forest = IsolationForest::fit(&data, ForestParams::default(), 42).unwrap();

        let outlier = forest.score(&[40.0, 40.0]).unwrap();
        let inlier = forest.score(&[5.0, 5.0]).unwrap();
        assert!(outlier > 0.62, "outlier scored {outlier}");
        assert!(inlier < 0.55, "inlier scored {inlier}");
        assert!(outlier > inlier + 0.2);
    }

    #[test]
    fn same_seed_same_scores() {
        let data = cluster(120, 3);
        let a = IsolationForest::fit(&data, ForestParams::default(), 99).unwrap();
        let b = IsolationForest::fit(&data, ForestParams::default(), 99).unwrap();
        for probe in [[5.0, 5.0], [4.1, 5.9], [12.0, 0.5]] {
            assert_eq!(a.score(&probe).unwrap(), b.score(&probe).unwrap());
        }
    }

    #[test]
    fn subsample_is_capped_at_n() {
        let data = cluster(50, 1);
        let forest = IsolationForest::fit(&data, ForestParams::default(), 1).unwrap();
        assert_eq!(forest.sample_size(), 50);
        assert_eq!(forest.n_trees(), 100);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            IsolationForest::fit(&[vec![1.0]], ForestParams::default(), 0),
            Err(AnomalyError::InvalidData(_))
        ));
        assert!(matches!(
            IsolationForest::fit(&[vec![1.0, 2.0], vec![1.0]], ForestParams::default(), 0),
            Err(AnomalyError::InvalidData(_))
        ));
        let params = ForestParams {
            n_trees: 0,
            ..Default::default()
        };
        assert!(matches!(
            IsolationForest::fit(&cluster(10, 0), params, 0),
            Err(AnomalyError::InvalidParams(_))
        ));

        let forest = IsolationForest::fit(&cluster(10, 0), ForestParams::default(), 0).unwrap();
        assert!(forest.score(&[1.0]).is_err());
    }
}
