use ndarray::{Array1, ArrayView1, ArrayView2};
use crate::{
    error::{SimError, Result},
    optimization::{with_intercept, CoordinateDescent, OptimizationConfig, StandardizedDesign},
};

/// gaussian linear model w/ elastic net regularization at a single lambda
#[derive(Debug, Clone)]
pub struct ElasticNet {
    coefficients: Option<Array1<f64>>,  // fitted slopes, original scale
    intercept: Option<f64>,             // unpenalized
    alpha: f64,                         // 1 = lasso, 0 = ridge
    lambda: f64,                        // overall penalty strength
    max_iterations: usize,              // sweep limit
    tolerance: f64,                     // convergence threshold
}

impl Default for ElasticNet {
    fn default() -> Self {
        let config = OptimizationConfig::default();
        Self {
            coefficients: None,
            intercept: None,
            alpha: config.alpha,
            lambda: 0.0,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

impl ElasticNet {
    /// plain lasso w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// penalty strength
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda.max(0.0);
        self
    }

    /// elastic net mixing: alpha=0 -> pure ridge, alpha=1 -> pure lasso
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// max sweeps before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    fn optimization_config(&self) -> OptimizationConfig {
        OptimizationConfig {
            alpha: self.alpha,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }

    /// fit to (x, y) - standardizes internally, reports on the original scale
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<&mut Self> {
        let config = self.optimization_config();
        config.validate()?;

        let design = StandardizedDesign::new(x, y)?;
        let solver = CoordinateDescent::new(config);

        let mut beta_std = Array1::zeros(design.n_features());
        solver.solve(&design, self.lambda, &mut beta_std)?;

        let (intercept, coefficients) = design.unstandardize(beta_std.view());
        self.intercept = Some(intercept);
        self.coefficients = Some(coefficients);

        Ok(self)
    }

    /// the fitted slopes (no intercept)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        match &self.coefficients {
            Some(coefs) => Ok(coefs.view()),
            None => Err(SimError::ModelNotFitted),
        }
    }

    pub fn intercept(&self) -> Result<f64> {
        self.intercept.ok_or(SimError::ModelNotFitted)
    }

    /// intercept first, then slopes
    pub fn coefficients_with_intercept(&self) -> Result<Array1<f64>> {
        Ok(with_intercept(self.intercept()?, self.coefficients()?.view()))
    }

    /// predict responses for new rows
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if x.ncols() != coefs.len() {
            return Err(SimError::dimension_mismatch(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), x.ncols())
            ));
        }

        Ok(x.dot(&coefs) + self.intercept()?)
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// (alpha, lambda)
    pub fn regularization_params(&self) -> (f64, f64) {
        (self.alpha, self.lambda)
    }
}
