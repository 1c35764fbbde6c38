use std::fmt;

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use crate::{
    cv::{CrossValidatedElasticNet, LambdaRule},
    data::SyntheticDataset,
    error::Result,
    forest::{ForestConfig, ForestGrower},
    metrics::SupportScores,
};

/// the competing variable selection methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "Lasso.1se")]
    LassoOneSe,
    #[serde(rename = "Lasso.min")]
    LassoMin,
    #[serde(rename = "Relaxed")]
    RelaxedLasso,
    #[serde(rename = "RF")]
    RandomForest,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::LassoOneSe,
        Method::LassoMin,
        Method::RelaxedLasso,
        Method::RandomForest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::LassoOneSe => "Lasso.1se",
            Method::LassoMin => "Lasso.min",
            Method::RelaxedLasso => "Relaxed",
            Method::RandomForest => "RF",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// what an estimator hands back before scoring
#[derive(Debug, Clone)]
pub struct Selection {
    pub estimate: Array1<f64>,       // coefficients (maybe w/ intercept) or 0/1 indicator
    pub error_metric: Option<f64>,   // cv mse or oob mse, None if undefined
}

/// one scored fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub retention: usize,
    pub identification: usize,
    pub nonzero: usize,
    pub error_metric: Option<f64>,
}

impl EstimateRecord {
    /// score a selection against the truth
    pub fn score(selection: &Selection, beta: ArrayView1<f64>) -> Result<Self> {
        let scores = SupportScores::compute(selection.estimate.view(), beta)?;
        Ok(Self {
            retention: scores.retention,
            identification: scores.identification,
            nonzero: scores.nonzero,
            error_metric: selection.error_metric.filter(|e| e.is_finite()),
        })
    }
}

/// anything that can pick variables out of a synthetic dataset
pub trait Estimator {
    fn method(&self) -> Method;

    fn select(&self, data: &SyntheticDataset, rng: &mut StdRng) -> Result<Selection>;
}

/// fit, then score against the true coefficients
pub fn evaluate(
    estimator: &dyn Estimator,
    data: &SyntheticDataset,
    beta: ArrayView1<f64>,
    rng: &mut StdRng,
) -> Result<EstimateRecord> {
    let selection = estimator.select(data, rng)?;
    let record = EstimateRecord::score(&selection, beta)?;
    log::debug!(
        "{}: retention {}, identification {}, nonzero {}, error {:?}",
        estimator.method(), record.retention, record.identification, record.nonzero, record.error_metric
    );
    Ok(record)
}

/// cross-validated lasso read off at one lambda rule
#[derive(Debug, Clone)]
pub struct LassoEstimator {
    rule: LambdaRule,
    cv: CrossValidatedElasticNet,
}

impl LassoEstimator {
    pub fn new(rule: LambdaRule, n_folds: usize) -> Self {
        let mut cv = CrossValidatedElasticNet::new().with_folds(n_folds);
        if rule == LambdaRule::Relaxed {
            cv = cv.with_relax();
        }
        Self { rule, cv }
    }

    /// swap in a custom cross-validation setup
    pub fn with_cv(mut self, cv: CrossValidatedElasticNet) -> Self {
        self.cv = if self.rule == LambdaRule::Relaxed { cv.with_relax() } else { cv };
        self
    }
}

impl Estimator for LassoEstimator {
    fn method(&self) -> Method {
        match self.rule {
            LambdaRule::OneSe => Method::LassoOneSe,
            LambdaRule::Min => Method::LassoMin,
            LambdaRule::Relaxed => Method::RelaxedLasso,
        }
    }

    fn select(&self, data: &SyntheticDataset, rng: &mut StdRng) -> Result<Selection> {
        let fit = self.cv.fit(data.x(), data.y(), rng)?;
        let picked = fit.select(self.rule)?;
        Ok(Selection {
            estimate: picked.coefficients,
            error_metric: Some(picked.cv_error),
        })
    }
}

/// random forest importance w/ two-stage selection
#[derive(Debug)]
pub struct ForestEstimator {
    grower: ForestGrower,
}

impl ForestEstimator {
    pub fn new(config: ForestConfig) -> Result<Self> {
        Ok(Self { grower: ForestGrower::new(config)? })
    }
}

impl Estimator for ForestEstimator {
    fn method(&self) -> Method {
        Method::RandomForest
    }

    fn select(&self, data: &SyntheticDataset, rng: &mut StdRng) -> Result<Selection> {
        let selection = self.grower.two_stage_select(data.x(), data.y(), rng)?;
        Ok(Selection {
            estimate: selection.indicator(data.n_features()),
            error_metric: selection.oob_error,
        })
    }
}

/// build the estimator behind a method name
pub fn build_estimator(method: Method, n_folds: usize, forest: &ForestConfig) -> Result<Box<dyn Estimator>> {
    Ok(match method {
        Method::LassoOneSe => Box::new(LassoEstimator::new(LambdaRule::OneSe, n_folds)),
        Method::LassoMin => Box::new(LassoEstimator::new(LambdaRule::Min, n_folds)),
        Method::RelaxedLasso => Box::new(LassoEstimator::new(LambdaRule::Relaxed, n_folds)),
        Method::RandomForest => Box::new(ForestEstimator::new(forest.clone())?),
    })
}
