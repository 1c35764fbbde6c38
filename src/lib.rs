//! # support recovery
//!
//! monte carlo harness for comparing variable selection methods on synthetic
//! regression data - lasso (cv 1se / min / relaxed) vs random forest importance
//!
//! ## what you get
//!
//! - ground-truth beta generators (equally spaced, leading block, weak decay)
//! - toeplitz-correlated designs w/ noise calibrated to a target snr
//! - support recovery scorers: retention, identification, nonzero
//! - elastic net via coordinate descent + glmnet-style cross validation
//! - cholesky / spd solves through faer for the design draw and ols refits
//! - regression forests w/ oob error, permutation importance, two-stage selection
//! - aggregation into per (snr, method) summary tables, csv out
//!
//! ## quick start
//!
//! ```rust
//! use support_recovery::{BetaPattern, LassoEstimator, LambdaRule, evaluate, simulate};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! // 3 true signals spread over 10 covariates
//! let beta = BetaPattern::EquallySpaced.generate(10, 3)?;
//! let data = simulate(100, 10, 0.35, beta.view(), 2.0, &mut rng)?;
//!
//! // lasso at lambda.1se, scored against the truth
//! let lasso = LassoEstimator::new(LambdaRule::OneSe, 10);
//! let record = evaluate(&lasso, &data, beta.view(), &mut rng)?;
//! assert!(record.retention <= 3);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod coefficients;
pub mod cv;
pub mod data;
pub mod error;
pub mod estimators;
pub mod experiment;
pub mod forest;
pub mod linalg;
pub mod metrics;
pub mod model;
pub mod optimization;

pub use aggregate::{error_rate, retention_frequency, summarize, AggregatedSummary, TaggedRecord};
pub use coefficients::BetaPattern;
pub use cv::{CrossValidatedElasticNet, LambdaRule};
pub use data::{simulate, SimulationConfig, SyntheticDataset};
pub use error::{SimError, Result};
pub use estimators::{evaluate, EstimateRecord, Estimator, ForestEstimator, LassoEstimator, Method};
pub use experiment::{Experiment, ExperimentConfig};
pub use forest::{ForestConfig, ForestGrower};
pub use metrics::SupportScores;
pub use model::ElasticNet;
