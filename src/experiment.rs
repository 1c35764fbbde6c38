//! The replicate x SNR x method loop.
//!
//! One true beta is drawn up front. Every (replicate, SNR) cell then gets a
//! fresh dataset from its own seeded rng and runs each configured method on
//! it in order, so any single replicate can be rerun on its own and come out
//! the same.

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use crate::{
    aggregate::TaggedRecord,
    coefficients::BetaPattern,
    data::simulate,
    error::{SimError, Result},
    estimators::{build_estimator, evaluate, Estimator, Method},
    forest::ForestConfig,
};

/// Everything a simulation run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub n: usize,
    pub p: usize,
    pub rho: f64,
    pub snr_values: Vec<f64>,
    pub sparsity: usize,
    pub pattern: BetaPattern,
    pub replicates: usize,
    pub seed: u64,
    pub methods: Vec<Method>,
    pub cv_folds: usize,
    pub forest: ForestConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            n: 100,
            p: 20,
            rho: 0.35,
            snr_values: vec![0.05, 0.25, 1.22, 6.0],
            sparsity: 5,
            pattern: BetaPattern::EquallySpaced,
            replicates: 10,
            seed: 42,
            methods: Method::ALL.to_vec(),
            cv_folds: 10,
            forest: ForestConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn new(n: usize, p: usize) -> Self {
        Self { n, p, ..Self::default() }
    }

    /// parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SimError::invalid_parameter("config", e.to_string()))
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_snr_values(mut self, snr_values: Vec<f64>) -> Self {
        self.snr_values = snr_values;
        self
    }

    pub fn with_sparsity(mut self, sparsity: usize) -> Self {
        self.sparsity = sparsity;
        self
    }

    pub fn with_pattern(mut self, pattern: BetaPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_replicates(mut self, replicates: usize) -> Self {
        self.replicates = replicates;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(SimError::invalid_parameter("n", self.n));
        }
        if self.p == 0 {
            return Err(SimError::invalid_parameter("p", self.p));
        }
        if !(0.0..1.0).contains(&self.rho) {
            return Err(SimError::invalid_parameter("rho", self.rho));
        }
        if self.snr_values.is_empty() {
            return Err(SimError::invalid_parameter("snr_values", "[]"));
        }
        if let Some(bad) = self.snr_values.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(SimError::invalid_parameter("snr", bad));
        }
        if self.sparsity == 0 || self.sparsity > self.p {
            return Err(SimError::invalid_parameter("sparsity", self.sparsity));
        }
        if self.replicates == 0 {
            return Err(SimError::invalid_parameter("replicates", self.replicates));
        }
        if self.methods.is_empty() {
            return Err(SimError::invalid_parameter("methods", "[]"));
        }
        if self.cv_folds < 3 || self.cv_folds > self.n {
            return Err(SimError::invalid_parameter("cv_folds", self.cv_folds));
        }
        self.forest.validate()
    }
}

/// A validated config w/ its true beta and estimators ready to go
pub struct Experiment {
    config: ExperimentConfig,
    beta: Array1<f64>,
    true_sparsity: usize,
    estimators: Vec<Box<dyn Estimator>>,
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("config", &self.config)
            .field("beta", &self.beta)
            .field("true_sparsity", &self.true_sparsity)
            .finish()
    }
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;

        let beta = config.pattern.generate(config.p, config.sparsity)?;
        let true_sparsity = beta.iter().filter(|&&b| b == 1.0).count();
        if !config.pattern.is_binary() {
            log::warn!("{:?} beta is not 0/1 - identification counts are only indicative", config.pattern);
        }

        let estimators = config
            .methods
            .iter()
            .map(|&m| build_estimator(m, config.cv_folds, &config.forest))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "experiment: n={}, p={}, rho={}, {} strongly significant, {} snr values, {} replicates",
            config.n, config.p, config.rho, true_sparsity, config.snr_values.len(), config.replicates
        );

        Ok(Self { config, beta, true_sparsity, estimators })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn beta(&self) -> ArrayView1<'_, f64> {
        self.beta.view()
    }

    /// count of entries equal to 1, what retention is normalized by
    pub fn true_sparsity(&self) -> usize {
        self.true_sparsity
    }

    fn cell_rng(&self, replicate: usize, snr_index: usize) -> StdRng {
        let cell = (replicate as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(snr_index as u64);
        StdRng::seed_from_u64(self.config.seed ^ cell)
    }

    /// one replicate across every snr and method
    pub fn run_replicate(&self, replicate: usize) -> Result<Vec<TaggedRecord>> {
        let cfg = &self.config;
        let mut out = Vec::with_capacity(cfg.snr_values.len() * self.estimators.len());

        for (snr_index, &snr) in cfg.snr_values.iter().enumerate() {
            let mut rng = self.cell_rng(replicate, snr_index);
            let data = simulate(cfg.n, cfg.p, cfg.rho, self.beta.view(), snr, &mut rng)?;
            log::info!("replicate {} snr {}: sigma {:.4}", replicate, snr, data.sigma());

            for estimator in &self.estimators {
                let record = evaluate(estimator.as_ref(), &data, self.beta.view(), &mut rng)?;
                out.push(TaggedRecord {
                    snr,
                    method: estimator.method(),
                    replicate,
                    record,
                });
            }
        }

        Ok(out)
    }

    /// every replicate, stopping at the first failure
    pub fn run(&self) -> Result<Vec<TaggedRecord>> {
        let mut records = Vec::new();
        for replicate in 0..self.config.replicates {
            records.extend(self.run_replicate(replicate)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig::new(60, 6)
            .with_sparsity(2)
            .with_pattern(BetaPattern::LeadingBlock)
            .with_snr_values(vec![1.0, 5.0])
            .with_replicates(2)
            .with_cv_folds(5)
            .with_methods(vec![Method::LassoMin, Method::LassoOneSe])
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(small_config().with_rho(1.0).validate().is_err());
        assert!(small_config().with_sparsity(0).validate().is_err());
        assert!(small_config().with_sparsity(7).validate().is_err());
        assert!(small_config().with_snr_values(vec![]).validate().is_err());
        assert!(small_config().with_snr_values(vec![1.0, -2.0]).validate().is_err());
        assert!(small_config().with_cv_folds(2).validate().is_err());
        assert!(small_config().with_methods(vec![]).validate().is_err());
        assert!(small_config().with_replicates(0).validate().is_err());
        assert!(small_config().with_forest(ForestConfig::default().with_trees(0)).validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ExperimentConfig::from_toml_str(r#"
            n = 80
            p = 12
            snr_values = [0.5, 2.0]
            methods = ["Lasso.1se", "RF"]

            [pattern]
            kind = "weak_decay"
            value = 0.5

            [forest]
            n_trees = 50
        "#).unwrap();

        assert_eq!(config.n, 80);
        assert_eq!(config.p, 12);
        assert_eq!(config.snr_values, vec![0.5, 2.0]);
        assert_eq!(config.methods, vec![Method::LassoOneSe, Method::RandomForest]);
        assert_eq!(config.pattern, BetaPattern::WeakDecay { value: 0.5 });
        assert_eq!(config.forest.n_trees, 50);
        assert_eq!(config.forest.min_node_size, 5);
        assert_eq!(config.sparsity, 5);
        assert_eq!(config.rho, 0.35);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(ExperimentConfig::from_toml_str("n = \"lots\"").is_err());
        assert!(ExperimentConfig::from_toml_str("methods = [\"Ridge\"]").is_err());
    }

    #[test]
    fn test_new_generates_beta() {
        let experiment = Experiment::new(small_config()).unwrap();
        assert_eq!(experiment.beta().to_vec(), vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(experiment.true_sparsity(), 2);

        let bad = small_config().with_pattern(BetaPattern::WeakDecay { value: 1.5 });
        assert!(Experiment::new(bad).is_err());
    }

    #[test]
    fn test_run_replicate_layout() {
        let experiment = Experiment::new(small_config()).unwrap();
        let records = experiment.run_replicate(0).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].snr, 1.0);
        assert_eq!(records[0].method, Method::LassoMin);
        assert_eq!(records[1].method, Method::LassoOneSe);
        assert_eq!(records[2].snr, 5.0);
        assert!(records.iter().all(|t| t.replicate == 0));
        assert!(records.iter().all(|t| t.record.retention <= 2));
        assert!(records.iter().all(|t| t.record.identification <= 6));
    }

    #[test]
    fn test_replicates_are_reproducible() {
        let experiment = Experiment::new(small_config()).unwrap();
        let all = experiment.run().unwrap();
        assert_eq!(all.len(), 8);

        let again = experiment.run_replicate(1).unwrap();
        assert_eq!(&all[4..], again.as_slice());
    }
}
