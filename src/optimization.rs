use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::{
    error::{SimError, Result},
    linalg::solve_spd,
};

/// Configuration for elastic net coordinate descent
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub alpha: f64,  // 1 = lasso, 0 = ridge
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iterations: 100_000,
            tolerance: 1e-7,
        }
    }
}

impl OptimizationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(SimError::invalid_parameter("alpha", self.alpha));
        }
        if self.max_iterations == 0 {
            return Err(SimError::invalid_parameter("max_iterations", self.max_iterations));
        }
        if !(self.tolerance > 0.0) {
            return Err(SimError::invalid_parameter("tolerance", self.tolerance));
        }
        Ok(())
    }
}

/// Design matrix standardized to mean 0 and (1/n) x'x = 1, with centered response.
///
/// Coefficients are solved on this scale and mapped back with
/// [`StandardizedDesign::unstandardize`].
#[derive(Debug, Clone)]
pub struct StandardizedDesign {
    x: Array2<f64>,
    y: Array1<f64>,
    means: Array1<f64>,
    scales: Array1<f64>,
    y_mean: f64,
}

impl StandardizedDesign {
    pub fn new(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(SimError::dimension_mismatch("design has no rows"));
        }
        if y.len() != n_samples {
            return Err(SimError::dimension_mismatch(
                format!("design rows ({}) != response len ({})", n_samples, y.len())
            ));
        }

        let n = n_samples as f64;
        let means = x.sum_axis(Axis(0)) / n;
        let mut x_std = &x - &means;
        let scales = x_std.map_axis(Axis(0), |col| (col.dot(&col) / n).sqrt());

        for (mut col, &scale) in x_std.axis_iter_mut(Axis(1)).zip(scales.iter()) {
            if scale > 0.0 {
                col /= scale;
            } else {
                // Constant column: leave it at zero so its coefficient stays zero
                col.fill(0.0);
            }
        }

        let y_mean = y.sum() / n;
        let y_centered = y.mapv(|v| v - y_mean);

        Ok(Self {
            x: x_std,
            y: y_centered,
            means,
            scales,
            y_mean,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Map standardized coefficients back to (intercept, coefficients) on the data scale
    pub fn unstandardize(&self, beta_std: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let coefficients = Array1::from_shape_fn(beta_std.len(), |j| {
            if self.scales[j] > 0.0 {
                beta_std[j] / self.scales[j]
            } else {
                0.0
            }
        });
        let intercept = self.y_mean - self.means.dot(&coefficients);
        (intercept, coefficients)
    }
}

/// Gaussian elastic net solver: cyclic coordinate descent with soft thresholding
#[derive(Debug, Clone)]
pub struct CoordinateDescent {
    config: OptimizationConfig,
}

impl CoordinateDescent {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Smallest lambda at which every coefficient is zero
    pub fn lambda_max(&self, design: &StandardizedDesign) -> f64 {
        let n = design.n_samples() as f64;
        let alpha = self.config.alpha.max(1e-3);
        let correlations = design.x.t().dot(&design.y);
        correlations.iter().fold(0.0_f64, |acc, &c| acc.max(c.abs())) / (n * alpha)
    }

    /// Decreasing log-spaced lambda sequence from lambda_max
    pub fn lambda_path(&self, design: &StandardizedDesign, n_lambda: usize) -> Result<Array1<f64>> {
        if n_lambda == 0 {
            return Err(SimError::invalid_parameter("n_lambda", n_lambda));
        }

        let lambda_max = self.lambda_max(design);
        if !(lambda_max > 0.0) || !lambda_max.is_finite() {
            return Err(SimError::numerical_error(
                format!("response has no correlation with any covariate (lambda_max = {})", lambda_max)
            ));
        }

        let ratio: f64 = if design.n_samples() > design.n_features() { 1e-4 } else { 1e-2 };
        if n_lambda == 1 {
            return Ok(Array1::from(vec![lambda_max]));
        }

        let last = (n_lambda - 1) as f64;
        Ok(Array1::from_shape_fn(n_lambda, |k| lambda_max * ratio.powf(k as f64 / last)))
    }

    /// Solve at one lambda, warm-started from `beta` (standardized scale). Returns sweeps used.
    pub fn solve(&self, design: &StandardizedDesign, lambda: f64, beta: &mut Array1<f64>) -> Result<usize> {
        let n_features = design.n_features();
        if beta.len() != n_features {
            return Err(SimError::dimension_mismatch(
                format!("warm start len ({}) != n_features ({})", beta.len(), n_features)
            ));
        }
        if !(lambda >= 0.0) {
            return Err(SimError::invalid_parameter("lambda", lambda));
        }

        let n = design.n_samples() as f64;
        let l1 = lambda * self.config.alpha;
        let l2 = lambda * (1.0 - self.config.alpha);

        // Residuals for the warm start
        let mut residual = &design.y - &design.x.dot(&*beta);

        for iteration in 0..self.config.max_iterations {
            let mut max_change = 0.0_f64;

            for j in 0..n_features {
                let column = design.x.column(j);
                if design.scales[j] <= 0.0 {
                    continue;
                }

                let beta_old_j = beta[j];
                // Columns have (1/n) x'x = 1, so the partial-residual fit is just this
                let z = column.dot(&residual) / n + beta_old_j;
                let beta_new_j = soft_threshold(z, l1) / (1.0 + l2);

                let delta = beta_new_j - beta_old_j;
                if delta != 0.0 {
                    residual.scaled_add(-delta, &column);
                    beta[j] = beta_new_j;
                    max_change = max_change.max(delta.abs());
                }
            }

            if !max_change.is_finite() {
                return Err(SimError::numerical_error("coordinate descent diverged"));
            }

            if max_change < self.config.tolerance {
                return Ok(iteration + 1);
            }
        }

        Err(SimError::optimization_failed(
            format!("coordinate descent failed to converge at lambda = {}", lambda)
        ))
    }

    /// Solve along a lambda sequence with warm starts; standardized coefficients per lambda
    pub fn fit_path(&self, design: &StandardizedDesign, lambdas: ArrayView1<f64>) -> Result<Vec<Array1<f64>>> {
        let mut beta = Array1::zeros(design.n_features());
        let mut path = Vec::with_capacity(lambdas.len());

        for &lambda in lambdas.iter() {
            let sweeps = self.solve(design, lambda, &mut beta)?;
            log::trace!("lambda {:.6}: {} sweeps", lambda, sweeps);
            path.push(beta.clone());
        }

        if let Some(last) = path.last() {
            log::debug!(
                "path of {} lambdas done, {} active at the end",
                lambdas.len(),
                last.iter().filter(|&&b| b != 0.0).count()
            );
        }

        Ok(path)
    }
}

/// Soft thresholding operator for L1 regularization
pub fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Unpenalized least squares w/ intercept on a subset of columns.
///
/// Returns (intercept, coefficients over all p columns, zero outside `active`).
pub fn ols_refit(x: ArrayView2<f64>, y: ArrayView1<f64>, active: &[usize]) -> Result<(f64, Array1<f64>)> {
    let n_samples = x.nrows();
    let k = active.len() + 1;
    if n_samples < k {
        return Err(SimError::numerical_error(
            format!("{} samples can't pin down {} parameters", n_samples, k)
        ));
    }

    // Intercept column first
    let design = Array2::from_shape_fn((n_samples, k), |(i, j)| {
        if j == 0 { 1.0 } else { x[[i, active[j - 1]]] }
    });

    let gram = design.t().dot(&design);
    let rhs = design.t().dot(&y);
    let solution = solve_spd(gram.view(), rhs.view())?;

    let mut coefficients = Array1::zeros(x.ncols());
    for (slot, &j) in active.iter().enumerate() {
        coefficients[j] = solution[slot + 1];
    }

    Ok((solution[0], coefficients))
}

/// intercept first, then slopes: the p+1 layout the scorers know how to strip
pub fn with_intercept(intercept: f64, coefs: ArrayView1<f64>) -> Array1<f64> {
    let mut full = Array1::zeros(coefs.len() + 1);
    full[0] = intercept;
    full.slice_mut(ndarray::s![1..]).assign(&coefs);
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2};
    use approx::assert_relative_eq;

    fn create_test_data() -> (Array2<f64>, Array1<f64>) {
        // y = 1 + 2 x0 - x1 exactly, x2 is unrelated
        let x = Array2::from_shape_vec((8, 3), vec![
            1.0, 0.0, 0.5,
            0.0, 1.0, -0.5,
            1.0, 1.0, 0.0,
            -1.0, 0.0, 1.0,
            0.0, -1.0, -1.0,
            1.0, -1.0, 0.5,
            -1.0, 1.0, -0.5,
            2.0, 0.5, 0.0,
        ]).unwrap();
        let y = x.column(0).mapv(|v| 2.0 * v) - &x.column(1) + 1.0;
        (x, y)
    }

    #[test]
    fn test_soft_threshold() {
        assert_relative_eq!(soft_threshold(2.0, 1.0), 1.0, epsilon = 1e-10);
        assert_relative_eq!(soft_threshold(-2.0, 1.0), -1.0, epsilon = 1e-10);
        assert_relative_eq!(soft_threshold(0.5, 1.0), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_standardization() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        for j in 0..3 {
            let col = design.x.column(j);
            assert_relative_eq!(col.sum(), 0.0, epsilon = 1e-10);
            assert_relative_eq!(col.dot(&col) / 8.0, 1.0, epsilon = 1e-10);
        }
        assert_relative_eq!(design.y.sum(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_column_stays_zero() {
        let x = Array2::from_shape_vec((4, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0, 5.0]).unwrap();
        let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig::default());
        let mut beta = Array1::zeros(2);
        solver.solve(&design, 0.0, &mut beta).unwrap();
        let (intercept, coefs) = design.unstandardize(beta.view());
        assert_eq!(coefs[1], 0.0);
        assert_relative_eq!(coefs[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(intercept, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lambda_max_zeroes_everything() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig::default());
        let lambda_max = solver.lambda_max(&design);

        let mut beta = Array1::zeros(3);
        solver.solve(&design, lambda_max * 1.0001, &mut beta).unwrap();
        assert!(beta.iter().all(|&b| b == 0.0));

        solver.solve(&design, lambda_max * 0.9, &mut beta).unwrap();
        assert!(beta.iter().any(|&b| b != 0.0));
    }

    #[test]
    fn test_lambda_path_decreasing() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig::default());
        let path = solver.lambda_path(&design, 20).unwrap();

        assert_eq!(path.len(), 20);
        assert_relative_eq!(path[0], solver.lambda_max(&design), epsilon = 1e-12);
        // n = 8 > p = 3 -> ratio 1e-4
        assert_relative_eq!(path[19], path[0] * 1e-4, epsilon = 1e-12);
        for k in 1..20 {
            assert!(path[k] < path[k - 1]);
        }
    }

    #[test]
    fn test_unpenalized_fit_recovers_truth() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig {
            tolerance: 1e-12,
            ..Default::default()
        });
        let mut beta = Array1::zeros(3);
        solver.solve(&design, 0.0, &mut beta).unwrap();
        let (intercept, coefs) = design.unstandardize(beta.view());

        assert_relative_eq!(intercept, 1.0, epsilon = 1e-6);
        assert_relative_eq!(coefs[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(coefs[1], -1.0, epsilon = 1e-6);
        assert_relative_eq!(coefs[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_without_zeroing() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig {
            alpha: 0.0,
            ..Default::default()
        });
        let mut beta = Array1::zeros(3);
        solver.solve(&design, 0.5, &mut beta).unwrap();
        let (_, coefs) = design.unstandardize(beta.view());
        assert!(coefs[0] > 0.0 && coefs[0] < 2.0);
        assert!(coefs[1] < 0.0 && coefs[1] > -1.0);
    }

    #[test]
    fn test_non_convergence_is_an_error() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig {
            max_iterations: 1,
            tolerance: 1e-15,
            ..Default::default()
        });
        let mut beta = Array1::zeros(3);
        let err = solver.solve(&design, 1e-3, &mut beta).unwrap_err();
        assert!(matches!(err, SimError::OptimizationFailed { .. }));
    }

    #[test]
    fn test_fit_path_warm_starts() {
        let (x, y) = create_test_data();
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig::default());
        let lambdas = solver.lambda_path(&design, 10).unwrap();
        let path = solver.fit_path(&design, lambdas.view()).unwrap();

        assert_eq!(path.len(), 10);
        assert!(path[0].iter().all(|&b| b.abs() < 1e-8));
        let active_last = path[9].iter().filter(|&&b| b != 0.0).count();
        assert!(active_last >= 2);
    }

    #[test]
    fn test_ols_refit_on_active_set() {
        let (x, y) = create_test_data();
        let (intercept, coefs) = ols_refit(x.view(), y.view(), &[0, 1]).unwrap();
        assert_relative_eq!(intercept, 1.0, epsilon = 1e-9);
        assert_relative_eq!(coefs[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(coefs[1], -1.0, epsilon = 1e-9);
        assert_eq!(coefs[2], 0.0);

        // intercept only
        let (mean, none) = ols_refit(x.view(), y.view(), &[]).unwrap();
        assert_relative_eq!(mean, y.mean().unwrap(), epsilon = 1e-9);
        assert!(none.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_ols_refit_rejects_collinear_columns() {
        let (x, y) = create_test_data();
        // column 0 twice
        let dup = ndarray::concatenate(Axis(1), &[x.view(), x.column(0).insert_axis(Axis(1))]).unwrap();
        let err = ols_refit(dup.view(), y.view(), &[0, 3]).unwrap_err();
        assert!(matches!(err, SimError::NumericalError { .. }));

        // more parameters than rows
        let short = x.slice(ndarray::s![..2, ..]).to_owned();
        assert!(ols_refit(short.view(), y.slice(ndarray::s![..2]), &[0, 1]).is_err());
    }

    #[test]
    fn test_lambda_path_ratio_when_p_exceeds_n() {
        // n = 4 <= p = 6 -> ratio 1e-2
        let x = Array2::from_shape_fn((4, 6), |(i, j)| ((i * 7 + j * 3) % 5) as f64 - 2.0 + 0.1 * j as f64);
        let y = arr1(&[1.0, -0.5, 2.0, 0.3]);
        let design = StandardizedDesign::new(x.view(), y.view()).unwrap();
        let solver = CoordinateDescent::new(OptimizationConfig::default());
        let path = solver.lambda_path(&design, 11).unwrap();

        assert_eq!(path.len(), 11);
        assert_relative_eq!(path[10], path[0] * 1e-2, epsilon = 1e-12);
        assert_relative_eq!(path[5], path[0] * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_with_intercept_layout() {
        let full = with_intercept(0.5, arr1(&[1.0, 0.0, -2.0]).view());
        assert_eq!(full, arr1(&[0.5, 1.0, 0.0, -2.0]));
        assert_eq!(with_intercept(3.0, Array1::<f64>::zeros(0).view()), arr1(&[3.0]));
    }
}
