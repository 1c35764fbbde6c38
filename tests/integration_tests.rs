use support_recovery::{
    aggregate::{write_records_csv, write_summary_csv},
    data::toeplitz_covariance,
    metrics::{var_identification, var_nonzero, var_retention},
    BetaPattern, CrossValidatedElasticNet, ElasticNet, Experiment, ExperimentConfig,
    ForestConfig, ForestEstimator, LambdaRule, LassoEstimator, Method, SimError,
    SimulationConfig, error_rate, evaluate, retention_frequency, simulate, summarize,
};
use ndarray::{arr1, Array2};
use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn create_synthetic_data(n: usize, p: usize, s: usize, snr: f64, seed: u64) -> (support_recovery::SyntheticDataset, ndarray::Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let beta = BetaPattern::EquallySpaced.generate(p, s).unwrap();
    let data = SimulationConfig::new(n, p)
        .with_rho(0.35)
        .with_snr(snr)
        .simulate(beta.view(), &mut rng)
        .unwrap();
    (data, beta)
}

#[test]
fn test_covariance_edge_cases() {
    assert_eq!(toeplitz_covariance(4, 0.0), Array2::<f64>::eye(4));
    assert_eq!(toeplitz_covariance(1, 0.6), Array2::from_elem((1, 1), 1.0));
}

#[test]
fn test_sigma_hits_target_snr() {
    let mut rng = StdRng::seed_from_u64(1);
    let beta = arr1(&[1.0, 0.0, 0.0, 0.0, 0.0]);
    let data = simulate(1000, 5, 0.0, beta.view(), 1.0, &mut rng).unwrap();
    assert!((data.sigma() - 1.0).abs() < 1e-9);
}

#[test]
fn test_beta_length_mismatch_fails_loudly() {
    let mut rng = StdRng::seed_from_u64(1);
    let beta = arr1(&[1.0, 0.0, 1.0]);
    let err = simulate(50, 5, 0.2, beta.view(), 1.0, &mut rng).unwrap_err();
    assert!(matches!(err, SimError::DimensionMismatch { .. }));
}

#[test]
fn test_same_seed_same_dataset() {
    let (a, _) = create_synthetic_data(80, 6, 2, 1.0, 99);
    let (b, _) = create_synthetic_data(80, 6, 2, 1.0, 99);
    assert_eq!(a.x(), b.x());
    assert_eq!(a.y(), b.y());

    let (c, _) = create_synthetic_data(80, 6, 2, 1.0, 100);
    assert_ne!(a.y(), c.y());
}

#[test]
fn test_scorers_on_perfect_estimate() {
    let beta = arr1(&[1.0, 0.0, 1.0, 0.0, 1.0]);
    assert_eq!(var_retention(beta.view(), beta.view()).unwrap(), 3);
    assert_eq!(var_identification(beta.view(), beta.view()).unwrap(), 5);
    assert_eq!(var_nonzero(beta.view(), beta.view()).unwrap(), 3);
}

#[test]
fn test_scorers_strip_intercept() {
    let beta = arr1(&[1.0, 0.0, 1.0, 0.0, 1.0]);
    let estimated = arr1(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    // aligned: [1, 1, 0, 0, 1]
    assert_eq!(var_retention(estimated.view(), beta.view()).unwrap(), 2);
    assert_eq!(var_identification(estimated.view(), beta.view()).unwrap(), 3);
    assert_eq!(var_nonzero(estimated.view(), beta.view()).unwrap(), 3);

    let too_long = arr1(&[0.0; 8]);
    assert!(var_retention(too_long.view(), beta.view()).is_err());
}

#[test]
fn test_aggregation_properties() {
    let rate = error_rate(&[Some(f64::INFINITY), Some(2.0), Some(4.0)]).unwrap();
    assert_relative_eq!(rate, 3.0);

    let records = [
        support_recovery::EstimateRecord { retention: 1, identification: 8, nonzero: 2, error_metric: None },
        support_recovery::EstimateRecord { retention: 3, identification: 9, nonzero: 4, error_metric: Some(1.0) },
    ];
    let freq = retention_frequency(&records, 4).unwrap();
    assert_relative_eq!(freq.retention, 50.0);
}

#[test]
fn test_elastic_net_recovers_support() {
    let (data, beta) = create_synthetic_data(200, 10, 3, 10.0, 5);
    let fit = CrossValidatedElasticNet::new()
        .with_folds(10)
        .fit(data.x(), data.y(), &mut StdRng::seed_from_u64(6))
        .unwrap();
    let chosen = fit.select(LambdaRule::Min).unwrap();

    assert_eq!(var_retention(chosen.coefficients.view(), beta.view()).unwrap(), 3);
    assert!(fit.lambda_1se() >= fit.lambda_min());

    // refit at the chosen lambda matches the path solution
    let mut model = ElasticNet::new().with_lambda(chosen.lambda);
    model.fit(data.x(), data.y()).unwrap();
    let refit = model.coefficients_with_intercept().unwrap();
    for (a, b) in refit.iter().zip(chosen.coefficients.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-3);
    }
}

#[test]
fn test_all_methods_on_one_dataset() {
    let (data, beta) = create_synthetic_data(150, 9, 3, 8.0, 11);
    let mut rng = StdRng::seed_from_u64(12);

    for rule in [LambdaRule::OneSe, LambdaRule::Min, LambdaRule::Relaxed] {
        let record = evaluate(&LassoEstimator::new(rule, 5), &data, beta.view(), &mut rng).unwrap();
        assert!(record.retention <= 3);
        assert!(record.identification <= 9);
        assert!(record.error_metric.unwrap() > 0.0);
    }

    let forest = ForestEstimator::new(
        ForestConfig::default().with_trees(60).with_forests(3, 2).with_workers(2)
    ).unwrap();
    let record = evaluate(&forest, &data, beta.view(), &mut rng).unwrap();
    assert!(record.retention <= 3);
    assert!(record.nonzero <= 9);
}

#[test]
fn test_forest_independent_of_worker_count() {
    let (data, _) = create_synthetic_data(80, 5, 2, 4.0, 21);
    let fit_with = |workers: usize| {
        let grower = support_recovery::ForestGrower::new(
            ForestConfig::default().with_trees(40).with_workers(workers)
        ).unwrap();
        grower.fit(data.x(), data.y(), &mut StdRng::seed_from_u64(3)).unwrap()
    };

    let one = fit_with(1);
    let four = fit_with(4);
    assert_eq!(one.oob_error(), four.oob_error());
    assert_eq!(one.importance(), four.importance());
}

#[test]
fn test_experiment_end_to_end() {
    let config = ExperimentConfig::new(60, 8)
        .with_sparsity(2)
        .with_snr_values(vec![0.5, 4.0])
        .with_replicates(2)
        .with_cv_folds(5)
        .with_forest(ForestConfig::default().with_trees(30).with_forests(2, 2))
        .with_seed(2024);
    let experiment = Experiment::new(config).unwrap();
    let records = experiment.run().unwrap();

    // 2 replicates x 2 snr x 4 methods
    assert_eq!(records.len(), 16);

    let summary = summarize(&records, experiment.true_sparsity()).unwrap();
    assert_eq!(summary.len(), 8);
    assert_eq!(summary[0].method, Method::LassoOneSe);
    assert_eq!(summary[3].method, Method::RandomForest);
    for row in &summary {
        assert!((0.0..=100.0).contains(&row.mean_retention));
        assert!(row.sd_retention.is_some());
    }

    let mut buf = Vec::new();
    write_records_csv(&records, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 17);

    let mut buf = Vec::new();
    write_summary_csv(&summary, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("SNR,Method,Mean_Ret,Mean_Zero,Mean_Pred,SD_Ret,SD_Zero,SD_Pred"));
    assert_eq!(text.lines().count(), 9);
}

#[test]
fn test_experiment_is_reproducible() {
    let config = ExperimentConfig::new(50, 6)
        .with_sparsity(2)
        .with_snr_values(vec![2.0])
        .with_replicates(2)
        .with_cv_folds(5)
        .with_methods(vec![Method::LassoMin, Method::RelaxedLasso]);

    let first = Experiment::new(config.clone()).unwrap().run().unwrap();
    let second = Experiment::new(config).unwrap().run().unwrap();
    assert_eq!(first, second);
}
