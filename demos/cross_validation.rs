use support_recovery::{
    BetaPattern, CrossValidatedElasticNet, ElasticNet, LambdaRule, SupportScores, simulate,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Cross-Validated Lasso Example");
    println!("=============================\n");

    let mut rng = StdRng::seed_from_u64(42);
    let beta = BetaPattern::LeadingBlock.generate(30, 5)?;
    let data = simulate(200, 30, 0.5, beta.view(), 2.0, &mut rng)?;

    println!("Dataset: {} samples, {} features, sigma {:.4}", data.n_samples(), data.n_features(), data.sigma());
    println!();

    let fit = CrossValidatedElasticNet::new()
        .with_folds(10)
        .with_relax()
        .fit(data.x(), data.y(), &mut rng)?;

    println!("CV curve (every 10th lambda)");
    println!("{:<12} {:<12} {:<12}", "lambda", "cvm", "cvsd");
    println!("{:-<36}", "");
    for i in (0..fit.lambdas().len()).step_by(10) {
        println!("{:<12.5} {:<12.4} {:<12.4}", fit.lambdas()[i], fit.cvm()[i], fit.cvsd()[i]);
    }
    println!();
    println!("lambda.min = {:.5}", fit.lambda_min());
    println!("lambda.1se = {:.5}", fit.lambda_1se());
    println!();

    println!("{:<12} {:<10} {:<8} {:<10} {:<10} {:<10}",
             "Rule", "lambda", "gamma", "Retention", "Ident.", "Nonzero");
    println!("{:-<64}", "");
    for (name, rule) in [("1se", LambdaRule::OneSe), ("min", LambdaRule::Min), ("relaxed", LambdaRule::Relaxed)] {
        let picked = fit.select(rule)?;
        let scores = SupportScores::compute(picked.coefficients.view(), beta.view())?;
        let gamma = picked.gamma.map(|g| format!("{:.2}", g)).unwrap_or_else(|| "-".to_string());
        println!("{:<12} {:<10.5} {:<8} {:<10} {:<10} {:<10}",
                 name, picked.lambda, gamma, scores.retention, scores.identification, scores.nonzero);
    }
    println!();

    // Same lambda, fit once on all the data
    let mut model = ElasticNet::new().with_lambda(fit.lambda_1se());
    model.fit(data.x(), data.y())?;
    println!("Refit at lambda.1se:");
    println!("  intercept: {:.4}", model.intercept()?);
    println!("  coefficients: {:.3}", model.coefficients()?);

    Ok(())
}
