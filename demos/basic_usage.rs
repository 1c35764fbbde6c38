use support_recovery::{
    BetaPattern, ForestConfig, ForestEstimator, LambdaRule, LassoEstimator, SimulationConfig,
    evaluate, metrics::binarize,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Support Recovery - Basic Usage Example");
    println!("======================================\n");

    let mut rng = StdRng::seed_from_u64(42);

    // Ground truth: 4 signals spread over 20 covariates
    let beta = BetaPattern::EquallySpaced.generate(20, 4)?;
    let support: Vec<usize> = beta.iter().enumerate().filter(|(_, b)| **b != 0.0).map(|(i, _)| i + 1).collect();

    println!("True coefficients:");
    println!("  - p = {}", beta.len());
    println!("  - support (1-based): {:?}", support);
    println!();

    let config = SimulationConfig::new(150, 20).with_rho(0.35).with_snr(1.0);
    let data = config.simulate(beta.view(), &mut rng)?;

    println!("Dataset Information:");
    println!("  - Number of samples: {}", data.n_samples());
    println!("  - Number of features: {}", data.n_features());
    println!("  - Noise sd for SNR {}: {:.4}", config.snr, data.sigma());
    println!();

    // Example 1: lasso at lambda.1se
    println!("Example 1: Lasso (lambda.1se)");
    println!("-----------------------------");
    let lasso = LassoEstimator::new(LambdaRule::OneSe, 10);
    let record = evaluate(&lasso, &data, beta.view(), &mut rng)?;
    println!("  Retention: {} / {}", record.retention, support.len());
    println!("  Identification: {} / {}", record.identification, beta.len());
    println!("  Nonzero: {}", record.nonzero);
    println!("  CV MSE: {:.4}", record.error_metric.unwrap_or(f64::NAN));
    println!();

    // Example 2: relaxed lasso
    println!("Example 2: Relaxed Lasso");
    println!("------------------------");
    let relaxed = LassoEstimator::new(LambdaRule::Relaxed, 10);
    let record = evaluate(&relaxed, &data, beta.view(), &mut rng)?;
    println!("  Retention: {} / {}", record.retention, support.len());
    println!("  Nonzero: {}", record.nonzero);
    println!();

    // Example 3: forest importance w/ two-stage selection
    println!("Example 3: Random Forest Selection");
    println!("----------------------------------");
    let forest = ForestEstimator::new(ForestConfig::default().with_trees(200).with_workers(4))?;
    let record = evaluate(&forest, &data, beta.view(), &mut rng)?;
    println!("  Retention: {} / {}", record.retention, support.len());
    println!("  Nonzero: {}", record.nonzero);
    match record.error_metric {
        Some(oob) => println!("  OOB MSE: {:.4}", oob),
        None => println!("  OOB MSE: - (nothing selected)"),
    }
    println!();

    println!("Binarized truth: {}", binarize(beta.view()));

    Ok(())
}
