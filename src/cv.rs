//! k-fold cross-validation over an elastic net lambda path
//!
//! Fits the full-data path once, re-fits it on each training split against the
//! same lambda sequence, and scores held-out mean squared error. The relaxed
//! variant also refits OLS on each active set and blends the two fits by
//! `gamma`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use crate::{
    error::{SimError, Result},
    optimization::{ols_refit, with_intercept, CoordinateDescent, OptimizationConfig, StandardizedDesign},
};

/// Which point of the cross-validation curve to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LambdaRule {
    /// Largest lambda within one standard error of the minimum
    OneSe,
    /// Lambda with the smallest CV error
    Min,
    /// Smallest CV error over (lambda, gamma) of the relaxed fit
    Relaxed,
}

/// Cross-validated elastic net
#[derive(Debug, Clone)]
pub struct CrossValidatedElasticNet {
    alpha: f64,
    n_folds: usize,
    n_lambda: usize,
    gammas: Option<Vec<f64>>,  // None = no relaxed fit
    max_iterations: usize,
    tolerance: f64,
}

impl Default for CrossValidatedElasticNet {
    fn default() -> Self {
        let config = OptimizationConfig::default();
        Self {
            alpha: config.alpha,
            n_folds: 10,
            n_lambda: 100,
            gammas: None,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

/// Gamma grid used when the relaxed fit is switched on without an explicit grid
pub const DEFAULT_GAMMAS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

impl CrossValidatedElasticNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_n_lambda(mut self, n_lambda: usize) -> Self {
        self.n_lambda = n_lambda;
        self
    }

    /// Also cross-validate the relaxed fit over the default gamma grid
    pub fn with_relax(mut self) -> Self {
        self.gammas = Some(DEFAULT_GAMMAS.to_vec());
        self
    }

    pub fn with_gammas(mut self, gammas: Vec<f64>) -> Self {
        self.gammas = Some(gammas);
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        if self.n_folds < 3 {
            return Err(SimError::invalid_parameter("n_folds", self.n_folds));
        }
        if self.n_folds > n_samples {
            return Err(SimError::invalid_parameter(
                "n_folds",
                format!("{} (more folds than samples: {})", self.n_folds, n_samples),
            ));
        }
        if let Some(gammas) = &self.gammas {
            if gammas.is_empty() || gammas.iter().any(|g| !(0.0..=1.0).contains(g)) {
                return Err(SimError::invalid_parameter("gammas", format!("{:?}", gammas)));
            }
        }
        Ok(())
    }

    /// Fit the path on all rows and cross-validate it. Fold ids come from `rng`.
    pub fn fit<R: Rng + ?Sized>(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, rng: &mut R) -> Result<CvFit> {
        let n_samples = x.nrows();
        if y.len() != n_samples {
            return Err(SimError::dimension_mismatch(
                format!("design rows ({}) != response len ({})", n_samples, y.len())
            ));
        }
        self.validate(n_samples)?;

        let config = OptimizationConfig {
            alpha: self.alpha,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        };
        config.validate()?;
        let solver = CoordinateDescent::new(config);

        // Full-data path fixes the lambda sequence for every fold
        let design = StandardizedDesign::new(x, y)?;
        let lambdas = solver.lambda_path(&design, self.n_lambda)?;
        let path = solver
            .fit_path(&design, lambdas.view())?
            .iter()
            .map(|beta| design.unstandardize(beta.view()))
            .collect::<Vec<_>>();
        let relaxed_path = match self.gammas {
            Some(_) => Some(relaxed_refits(x, y, &path)),
            None => None,
        };

        let fold_ids = assign_folds(n_samples, self.n_folds, rng);
        let n_lambda = lambdas.len();
        let gammas = self.gammas.clone().unwrap_or_default();

        let mut fold_errors = Array2::<f64>::zeros((self.n_folds, n_lambda));
        let mut relaxed_errors = Array2::<f64>::zeros((gammas.len(), self.n_folds * n_lambda));
        let mut fold_sizes = Array1::<f64>::zeros(self.n_folds);

        for fold in 0..self.n_folds {
            let (train, test): (Vec<usize>, Vec<usize>) =
                (0..n_samples).partition(|&i| fold_ids[i] != fold);
            fold_sizes[fold] = test.len() as f64;

            let x_train = x.select(Axis(0), &train);
            let y_train = y.select(Axis(0), &train);
            let x_test = x.select(Axis(0), &test);
            let y_test = y.select(Axis(0), &test);

            let fold_design = StandardizedDesign::new(x_train.view(), y_train.view())?;
            let fold_path = solver
                .fit_path(&fold_design, lambdas.view())?
                .iter()
                .map(|beta| fold_design.unstandardize(beta.view()))
                .collect::<Vec<_>>();

            for (l, (intercept, coefs)) in fold_path.iter().enumerate() {
                fold_errors[[fold, l]] = mean_squared_error(x_test.view(), y_test.view(), *intercept, coefs.view());
            }

            if !gammas.is_empty() {
                let fold_relaxed = relaxed_refits(x_train.view(), y_train.view(), &fold_path);
                for (l, ((lasso_b0, lasso_b), (ols_b0, ols_b))) in fold_path.iter().zip(fold_relaxed.iter()).enumerate() {
                    for (g, &gamma) in gammas.iter().enumerate() {
                        let b0 = gamma * lasso_b0 + (1.0 - gamma) * ols_b0;
                        let b = lasso_b * gamma + ols_b * (1.0 - gamma);
                        relaxed_errors[[g, fold * n_lambda + l]] =
                            mean_squared_error(x_test.view(), y_test.view(), b0, b.view());
                    }
                }
            }

            log::debug!("fold {}/{}: {} held out", fold + 1, self.n_folds, test.len());
        }

        let (cvm, cvsd) = summarize_folds(fold_errors.view(), fold_sizes.view());

        let relaxed = if gammas.is_empty() {
            None
        } else {
            let mut cvm_grid = Array2::zeros((gammas.len(), n_lambda));
            let mut cvsd_grid = Array2::zeros((gammas.len(), n_lambda));
            for g in 0..gammas.len() {
                let per_fold = relaxed_errors
                    .row(g)
                    .to_owned()
                    .into_shape_with_order((self.n_folds, n_lambda))
                    .map_err(|e| SimError::numerical_error(e.to_string()))?;
                let (m, s) = summarize_folds(per_fold.view(), fold_sizes.view());
                cvm_grid.row_mut(g).assign(&m);
                cvsd_grid.row_mut(g).assign(&s);
            }
            Some(RelaxedCv {
                gammas,
                cvm: cvm_grid,
                cvsd: cvsd_grid,
            })
        };

        Ok(CvFit {
            lambdas,
            cvm,
            cvsd,
            path,
            relaxed_path,
            relaxed,
        })
    }
}

/// Cross-validation curve of the relaxed fit, one row per gamma
#[derive(Debug, Clone)]
pub struct RelaxedCv {
    pub gammas: Vec<f64>,
    pub cvm: Array2<f64>,
    pub cvsd: Array2<f64>,
}

/// Coefficients picked off a cross-validated path
#[derive(Debug, Clone)]
pub struct CvSelection {
    pub coefficients: Array1<f64>,  // intercept first, length p + 1
    pub lambda: f64,
    pub gamma: Option<f64>,
    pub cv_error: f64,
}

/// Result of [`CrossValidatedElasticNet::fit`]
#[derive(Debug, Clone)]
pub struct CvFit {
    lambdas: Array1<f64>,
    cvm: Array1<f64>,
    cvsd: Array1<f64>,
    path: Vec<(f64, Array1<f64>)>,
    relaxed_path: Option<Vec<(f64, Array1<f64>)>>,
    relaxed: Option<RelaxedCv>,
}

impl CvFit {
    pub fn lambdas(&self) -> ArrayView1<'_, f64> {
        self.lambdas.view()
    }

    /// Mean CV error per lambda
    pub fn cvm(&self) -> ArrayView1<'_, f64> {
        self.cvm.view()
    }

    /// Standard error of the CV error per lambda
    pub fn cvsd(&self) -> ArrayView1<'_, f64> {
        self.cvsd.view()
    }

    pub fn relaxed(&self) -> Option<&RelaxedCv> {
        self.relaxed.as_ref()
    }

    fn index_min(&self) -> usize {
        let min = self.cvm.iter().copied().fold(f64::INFINITY, f64::min);
        // Lambdas decrease, so the first hit is the largest lambda at the minimum
        self.cvm.iter().position(|&e| e <= min).unwrap_or(0)
    }

    fn index_1se(&self) -> usize {
        let i_min = self.index_min();
        let bound = self.cvm[i_min] + self.cvsd[i_min];
        self.cvm.iter().position(|&e| e <= bound).unwrap_or(i_min)
    }

    pub fn lambda_min(&self) -> f64 {
        self.lambdas[self.index_min()]
    }

    pub fn lambda_1se(&self) -> f64 {
        self.lambdas[self.index_1se()]
    }

    /// Coefficients (intercept first) and CV error at the point `rule` picks
    pub fn select(&self, rule: LambdaRule) -> Result<CvSelection> {
        match rule {
            LambdaRule::Min | LambdaRule::OneSe => {
                let index = if rule == LambdaRule::Min { self.index_min() } else { self.index_1se() };
                let (intercept, coefs) = &self.path[index];
                Ok(CvSelection {
                    coefficients: with_intercept(*intercept, coefs.view()),
                    lambda: self.lambdas[index],
                    gamma: None,
                    cv_error: self.cvm[index],
                })
            }
            LambdaRule::Relaxed => {
                let (relaxed, relaxed_path) = match (&self.relaxed, &self.relaxed_path) {
                    (Some(r), Some(p)) => (r, p),
                    _ => {
                        return Err(SimError::invalid_parameter(
                            "lambda rule",
                            "relaxed (fit was run without a gamma grid)",
                        ));
                    }
                };

                let mut best = (0, 0, f64::INFINITY);
                for (g, row) in relaxed.cvm.axis_iter(Axis(0)).enumerate() {
                    for (l, &err) in row.iter().enumerate() {
                        if err < best.2 {
                            best = (g, l, err);
                        }
                    }
                }
                let (g, l, cv_error) = best;
                if !cv_error.is_finite() {
                    return Err(SimError::numerical_error("relaxed CV error is not finite anywhere"));
                }

                let gamma = relaxed.gammas[g];
                let (lasso_b0, lasso_b) = &self.path[l];
                let (ols_b0, ols_b) = &relaxed_path[l];
                let intercept = gamma * lasso_b0 + (1.0 - gamma) * ols_b0;
                let coefs = lasso_b * gamma + ols_b * (1.0 - gamma);

                Ok(CvSelection {
                    coefficients: with_intercept(intercept, coefs.view()),
                    lambda: self.lambdas[l],
                    gamma: Some(gamma),
                    cv_error,
                })
            }
        }
    }
}

/// Fold id per row: `rep(0..k, length n)` in random order
fn assign_folds<R: Rng + ?Sized>(n_samples: usize, n_folds: usize, rng: &mut R) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..n_samples).map(|i| i % n_folds).collect();
    ids.shuffle(rng);
    ids
}

/// OLS on each distinct active set along a path; falls back to the lasso fit when singular
fn relaxed_refits(x: ArrayView2<f64>, y: ArrayView1<f64>, path: &[(f64, Array1<f64>)]) -> Vec<(f64, Array1<f64>)> {
    let mut refits: Vec<(f64, Array1<f64>)> = Vec::with_capacity(path.len());
    let mut previous: Option<Vec<usize>> = None;

    for (intercept, coefs) in path {
        let active: Vec<usize> = coefs
            .iter()
            .enumerate()
            .filter_map(|(j, &b)| if b != 0.0 { Some(j) } else { None })
            .collect();

        // Neighbouring lambdas usually share an active set
        if previous.as_ref() == Some(&active) {
            if let Some(last) = refits.last().cloned() {
                refits.push(last);
                continue;
            }
        }

        let refit = match ols_refit(x, y, &active) {
            Ok(fit) => fit,
            Err(e) => {
                log::debug!("relaxed refit on {} variables fell back to lasso: {}", active.len(), e);
                (*intercept, coefs.clone())
            }
        };
        refits.push(refit);
        previous = Some(active);
    }

    refits
}

fn mean_squared_error(x: ArrayView2<f64>, y: ArrayView1<f64>, intercept: f64, coefs: ArrayView1<f64>) -> f64 {
    let residual = &y - &(x.dot(&coefs) + intercept);
    residual.dot(&residual) / y.len() as f64
}

/// Fold-size-weighted mean and standard error of per-fold errors (rows = folds)
fn summarize_folds(errors: ArrayView2<f64>, weights: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let n_folds = errors.nrows() as f64;
    let total = weights.sum();

    let cvm = errors.t().dot(&weights) / total;
    let cvsd = Array1::from_shape_fn(errors.ncols(), |l| {
        let spread: f64 = errors
            .column(l)
            .iter()
            .zip(weights.iter())
            .map(|(&e, &w)| w * (e - cvm[l]).powi(2))
            .sum();
        (spread / total / (n_folds - 1.0)).sqrt()
    });

    (cvm, cvsd)
}
