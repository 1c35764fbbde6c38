//! Regression random forest w/ out-of-bag error and permutation importance.
//!
//! Trees are grown on a rayon pool. Every tree gets its own `StdRng` seeded
//! from values drawn up front from the caller's rng, so a fit depends only on
//! that rng and never on how many workers ran it.
//!
//! [`ForestGrower::two_stage_select`] turns importances into a variable
//! selection: a noise-floor threshold on mean importance, then nested forests
//! over the survivors in rank order, keeping the smallest model whose OOB
//! error is within one standard deviation of the best.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use crate::error::{SimError, Result};

/// Forest and selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub mtry: Option<usize>,          // None = max(p / 3, 1)
    pub min_node_size: usize,
    pub n_workers: usize,             // threads growing trees
    pub n_forests_threshold: usize,   // forests averaged for the importance ranking
    pub n_forests_interp: usize,      // forests per nested model
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 500,
            mtry: None,
            min_node_size: 5,
            n_workers: 1,
            n_forests_threshold: 10,
            n_forests_interp: 5,
        }
    }
}

impl ForestConfig {
    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn with_mtry(mut self, mtry: usize) -> Self {
        self.mtry = Some(mtry);
        self
    }

    pub fn with_min_node_size(mut self, size: usize) -> Self {
        self.min_node_size = size;
        self
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    pub fn with_forests(mut self, threshold: usize, interp: usize) -> Self {
        self.n_forests_threshold = threshold;
        self.n_forests_interp = interp;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(SimError::invalid_parameter("n_trees", self.n_trees));
        }
        if self.mtry == Some(0) {
            return Err(SimError::invalid_parameter("mtry", 0));
        }
        if self.min_node_size == 0 {
            return Err(SimError::invalid_parameter("min_node_size", self.min_node_size));
        }
        if self.n_workers == 0 {
            return Err(SimError::invalid_parameter("n_workers", self.n_workers));
        }
        if self.n_forests_threshold == 0 {
            return Err(SimError::invalid_parameter("n_forests_threshold", self.n_forests_threshold));
        }
        if self.n_forests_interp == 0 {
            return Err(SimError::invalid_parameter("n_forests_interp", self.n_forests_interp));
        }
        Ok(())
    }

    fn mtry_for(&self, n_features: usize) -> usize {
        match self.mtry {
            Some(m) => m.min(n_features),
            None => (n_features / 3).max(1),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// CART regression tree, root at index 0
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Predict from a feature lookup, so permuted rows don't need copying
    fn predict_by<F: Fn(usize) -> f64>(&self, value_of: F) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right } => {
                    id = if value_of(feature) <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.predict_by(|j| row[j])
    }

    /// Features this tree actually splits on
    fn split_features(&self) -> Vec<usize> {
        let mut features: Vec<usize> = self
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .collect();
        features.sort_unstable();
        features.dedup();
        features
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Best variance-reducing split over `mtry` random features
fn best_split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    rows: &[usize],
    mtry: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n;

    let mut best: Option<SplitCandidate> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(rows.len());

    for feature in rand::seq::index::sample(rng, x.ncols(), mtry).into_iter() {
        pairs.clear();
        pairs.extend(rows.iter().map(|&i| (x[[i, feature]], y[i])));
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for k in 0..pairs.len() - 1 {
            left_sum += pairs[k].1;
            if pairs[k].0 == pairs[k + 1].0 {
                continue;
            }

            let left_n = (k + 1) as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            // SSE reduction, written as the between-group sum of squares
            let gain = left_sum * left_sum / left_n + right_sum * right_sum / right_n - parent_score;

            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                let (lo, hi) = (pairs[k].0, pairs[k + 1].0);
                let mid = 0.5 * (lo + hi);
                best = Some(SplitCandidate {
                    feature,
                    threshold: if mid < hi { mid } else { lo },
                    gain,
                });
            }
        }
    }

    best
}

fn grow_node(
    nodes: &mut Vec<Node>,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    rows: &mut [usize],
    mtry: usize,
    min_node_size: usize,
    rng: &mut StdRng,
) -> usize {
    let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
    let id = nodes.len();
    nodes.push(Node::Leaf { value: mean });

    if rows.len() < 2 * min_node_size {
        return id;
    }

    let Some(split) = best_split(x, y, rows, mtry, rng) else {
        return id;
    };

    // Partition in place: rows going left first
    let mut mid = 0;
    for k in 0..rows.len() {
        if x[[rows[k], split.feature]] <= split.threshold {
            rows.swap(mid, k);
            mid += 1;
        }
    }

    let (left_rows, right_rows) = rows.split_at_mut(mid);
    let left = grow_node(nodes, x, y, left_rows, mtry, min_node_size, rng);
    let right = grow_node(nodes, x, y, right_rows, mtry, min_node_size, rng);
    nodes[id] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
    };

    id
}

/// One tree plus what it knows about its out-of-bag rows
struct TreeFit {
    tree: RegressionTree,
    oob_rows: Vec<usize>,
    oob_predictions: Vec<f64>,
    importance: Option<Vec<f64>>,  // None when the tree has no OOB rows
}

fn fit_tree(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    mtry: usize,
    min_node_size: usize,
    seed: u64,
) -> TreeFit {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_samples = x.nrows();
    let n_features = x.ncols();

    let mut in_bag = vec![false; n_samples];
    let mut rows: Vec<usize> = (0..n_samples)
        .map(|_| {
            let i = rng.gen_range(0..n_samples);
            in_bag[i] = true;
            i
        })
        .collect();

    let mut nodes = Vec::new();
    grow_node(&mut nodes, x, y, &mut rows, mtry, min_node_size, &mut rng);
    let tree = RegressionTree { nodes };

    let oob_rows: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    let oob_predictions: Vec<f64> = oob_rows.iter().map(|&i| tree.predict_row(x.row(i))).collect();

    let importance = if oob_rows.is_empty() {
        None
    } else {
        let m = oob_rows.len() as f64;
        let base: f64 = oob_rows
            .iter()
            .zip(oob_predictions.iter())
            .map(|(&i, &pred)| (y[i] - pred).powi(2))
            .sum::<f64>()
            / m;

        // Unused features can't change a prediction, their importance stays 0
        let mut importance = vec![0.0; n_features];
        let mut permuted = oob_rows.clone();
        for feature in tree.split_features() {
            permuted.copy_from_slice(&oob_rows);
            permuted.shuffle(&mut rng);

            let mse: f64 = oob_rows
                .iter()
                .zip(permuted.iter())
                .map(|(&i, &donor)| {
                    let pred = tree.predict_by(|j| if j == feature { x[[donor, j]] } else { x[[i, j]] });
                    (y[i] - pred).powi(2)
                })
                .sum::<f64>()
                / m;
            importance[feature] = mse - base;
        }
        Some(importance)
    };

    TreeFit {
        tree,
        oob_rows,
        oob_predictions,
        importance,
    }
}

/// A fitted forest
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    oob_error: f64,
    importance: Array1<f64>,
}

impl RandomForest {
    /// OOB mean squared error
    pub fn oob_error(&self) -> f64 {
        self.oob_error
    }

    /// Mean increase in OOB MSE when each variable is permuted
    pub fn importance(&self) -> ArrayView1<'_, f64> {
        self.importance.view()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Average of the tree predictions
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.importance.len() {
            return Err(SimError::dimension_mismatch(
                format!("feature count mismatch: expected {}, got {}", self.importance.len(), x.ncols())
            ));
        }
        let n_trees = self.trees.len() as f64;
        Ok(Array1::from_shape_fn(x.nrows(), |i| {
            let row = x.row(i);
            self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
        }))
    }
}

/// Outcome of the two-stage importance selection
#[derive(Debug, Clone)]
pub struct TwoStageSelection {
    pub mean_importance: Array1<f64>,
    pub sd_importance: Array1<f64>,
    pub ranking: Vec<usize>,         // most important first
    pub threshold: f64,
    pub kept: Vec<usize>,            // stage 1 survivors, rank order
    pub nested_errors: Vec<f64>,     // mean OOB error of the top-k model, k = 1..=kept.len()
    pub selected: Vec<usize>,        // stage 2 choice
    pub oob_error: Option<f64>,      // None when nothing survived stage 1
}

impl TwoStageSelection {
    /// 0/1 indicator over all `n_features` variables
    pub fn indicator(&self, n_features: usize) -> Array1<f64> {
        let mut out = Array1::zeros(n_features);
        for &j in &self.selected {
            out[j] = 1.0;
        }
        out
    }
}

/// Grows forests on a dedicated worker pool
pub struct ForestGrower {
    config: ForestConfig,
    pool: ThreadPool,
}

impl std::fmt::Debug for ForestGrower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForestGrower")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl ForestGrower {
    pub fn new(config: ForestConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build()
            .map_err(|e| SimError::thread_pool(e.to_string()))?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Grow one forest; blocks until every tree is done
    pub fn fit<R: Rng + ?Sized>(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, rng: &mut R) -> Result<RandomForest> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if y.len() != n_samples {
            return Err(SimError::dimension_mismatch(
                format!("design rows ({}) != response len ({})", n_samples, y.len())
            ));
        }
        if n_samples < 2 || n_features == 0 {
            return Err(SimError::dimension_mismatch(
                format!("forest needs at least 2 rows and 1 column, got {}x{}", n_samples, n_features)
            ));
        }

        let mtry = self.config.mtry_for(n_features);
        let min_node_size = self.config.min_node_size;
        let seeds: Vec<u64> = (0..self.config.n_trees).map(|_| rng.r#gen()).collect();

        let fits: Vec<TreeFit> = self.pool.install(|| {
            seeds
                .par_iter()
                .map(|&seed| fit_tree(x, y, mtry, min_node_size, seed))
                .collect()
        });

        let mut oob_sum = vec![0.0; n_samples];
        let mut oob_count = vec![0usize; n_samples];
        let mut importance = Array1::<f64>::zeros(n_features);
        let mut trees_with_oob = 0usize;
        let mut trees = Vec::with_capacity(fits.len());

        for fit in fits {
            for (&i, &pred) in fit.oob_rows.iter().zip(fit.oob_predictions.iter()) {
                oob_sum[i] += pred;
                oob_count[i] += 1;
            }
            if let Some(tree_importance) = &fit.importance {
                importance += &ArrayView1::from(tree_importance.as_slice());
                trees_with_oob += 1;
            }
            trees.push(fit.tree);
        }

        let (sq_error, covered) = (0..n_samples)
            .filter(|&i| oob_count[i] > 0)
            .fold((0.0, 0usize), |(acc, c), i| {
                let pred = oob_sum[i] / oob_count[i] as f64;
                (acc + (y[i] - pred).powi(2), c + 1)
            });

        if covered == 0 || trees_with_oob == 0 {
            return Err(SimError::numerical_error(
                "no out-of-bag rows - grow more trees"
            ));
        }

        importance /= trees_with_oob as f64;
        let oob_error = sq_error / covered as f64;

        log::trace!(
            "forest: {} trees, mtry {}, oob mse {:.4} over {} rows",
            trees.len(), mtry, oob_error, covered
        );

        Ok(RandomForest {
            trees,
            oob_error,
            importance,
        })
    }

    /// Threshold on importance, then pick the smallest good nested model
    pub fn two_stage_select<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rng: &mut R,
    ) -> Result<TwoStageSelection> {
        let n_features = x.ncols();
        let n_forests = self.config.n_forests_threshold;

        // Stage 1: importance ranking and noise floor
        let mut importances = Array2::<f64>::zeros((n_forests, n_features));
        for f in 0..n_forests {
            let forest = self.fit(x, y, rng)?;
            importances.row_mut(f).assign(&forest.importance());
        }

        let mean_importance = importances.mean_axis(Axis(0)).ok_or_else(|| {
            SimError::numerical_error("no importance rows to average")
        })?;
        let sd_importance = if n_forests > 1 {
            importances.std_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(n_features)
        };

        let mut ranking: Vec<usize> = (0..n_features).collect();
        ranking.sort_by(|&a, &b| mean_importance[b].total_cmp(&mean_importance[a]));

        let bottom = (n_features / 2).max(1);
        let mut floor: Vec<f64> = ranking[n_features - bottom..]
            .iter()
            .map(|&j| sd_importance[j])
            .collect();
        let threshold = median(&mut floor);

        let kept: Vec<usize> = ranking
            .iter()
            .copied()
            .filter(|&j| mean_importance[j] > threshold)
            .collect();

        log::debug!(
            "two-stage: threshold {:.5}, {} of {} variables kept",
            threshold, kept.len(), n_features
        );

        if kept.is_empty() {
            return Ok(TwoStageSelection {
                mean_importance,
                sd_importance,
                ranking,
                threshold,
                kept,
                nested_errors: Vec::new(),
                selected: Vec::new(),
                oob_error: None,
            });
        }

        // Stage 2: nested models over the survivors
        let mut nested_errors = Vec::with_capacity(kept.len());
        let mut nested_sds = Vec::with_capacity(kept.len());
        for k in 1..=kept.len() {
            let x_top = x.select(Axis(1), &kept[..k]);
            let errors = (0..self.config.n_forests_interp)
                .map(|_| self.fit(x_top.view(), y, rng).map(|f| f.oob_error()))
                .collect::<Result<Vec<f64>>>()?;
            let errors = Array1::from(errors);
            let mean = errors.mean().unwrap_or(f64::NAN);
            let sd = if errors.len() > 1 { errors.std(1.0) } else { 0.0 };
            nested_errors.push(mean);
            nested_sds.push(sd);
        }

        let best = nested_errors
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap_or(0);
        let bound = nested_errors[best] + nested_sds[best];
        let chosen = nested_errors.iter().position(|&e| e <= bound).unwrap_or(best);

        let selected = kept[..=chosen].to_vec();
        let oob_error = Some(nested_errors[chosen]);

        log::debug!(
            "two-stage: nested model with {} variables, oob mse {:.4}",
            selected.len(), nested_errors[chosen]
        );

        Ok(TwoStageSelection {
            mean_importance,
            sd_importance,
            ranking,
            threshold,
            kept,
            nested_errors,
            selected,
            oob_error,
        })
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}
