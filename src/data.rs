use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use crate::{
    error::{SimError, Result},
    linalg::cholesky,
};

/// the knobs for one synthetic regression problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub n: usize,   // sample count
    pub p: usize,   // covariate count
    pub rho: f64,   // covariance decay, corr(x_i, x_j) = rho^|i-j|
    pub snr: f64,   // target var(signal) / var(noise)
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n: 100,
            p: 10,
            rho: 0.35,
            snr: 1.0,
        }
    }
}

impl SimulationConfig {
    /// new config w/ defaults
    pub fn new(n: usize, p: usize) -> Self {
        Self { n, p, ..Default::default() }
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_snr(mut self, snr: f64) -> Self {
        self.snr = snr;
        self
    }

    /// check everything up front - nothing degenerate gets through
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(SimError::invalid_parameter("n", self.n));
        }
        if self.p == 0 {
            return Err(SimError::invalid_parameter("p", self.p));
        }
        if !(self.rho >= 0.0 && self.rho < 1.0) {
            return Err(SimError::invalid_parameter("rho", self.rho));
        }
        if !(self.snr > 0.0 && self.snr.is_finite()) {
            return Err(SimError::invalid_parameter("snr", self.snr));
        }
        Ok(())
    }

    /// draw one dataset for this config - see [`simulate`]
    pub fn simulate<R: Rng + ?Sized>(&self, beta: ArrayView1<f64>, rng: &mut R) -> Result<SyntheticDataset> {
        simulate(self.n, self.p, self.rho, beta, self.snr, rng)
    }
}

/// one synthetic regression problem - design, response, and the noise scale used
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    x: Array2<f64>,   // design matrix (n x p)
    y: Array1<f64>,   // response
    sigma: f64,       // noise sd solved from the target snr
}

impl SyntheticDataset {
    /// wrap an existing design/response pair
    pub fn new(x: Array2<f64>, y: Array1<f64>, sigma: f64) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(SimError::dimension_mismatch(
                format!("design rows ({}) != response len ({})", x.nrows(), y.len())
            ));
        }
        if !(sigma >= 0.0 && sigma.is_finite()) {
            return Err(SimError::invalid_parameter("sigma", sigma));
        }
        Ok(Self { x, y, sigma })
    }

    /// how many samples
    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    /// how many covariates
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// grab a subset of rows by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SimError::dimension_mismatch("subset index out of bounds"));
        }

        let x = self.x.select(ndarray::Axis(0), indices);
        let y = self.y.select(ndarray::Axis(0), indices);
        Self::new(x, y, self.sigma)
    }
}

/// toeplitz covariance w/ geometric decay: sigma[i][j] = rho^|i-j|
pub fn toeplitz_covariance(p: usize, rho: f64) -> Array2<f64> {
    // powi(0) is 1 even for rho = 0, so the diagonal is always 1
    Array2::from_shape_fn((p, p), |(i, j)| rho.powi(i.abs_diff(j) as i32))
}

/// draw a correlated design and a response calibrated to hit `snr` in expectation.
///
/// `X` rows are iid N(0, Sigma) w/ Sigma = [`toeplitz_covariance`]`(p, rho)`,
/// `sigma = sqrt(beta' Sigma beta / snr)`, and `Y = X beta + sigma * eps`.
/// All randomness comes from `rng` (design first, then noise), so a seeded rng
/// reproduces the dataset exactly. The function itself keeps no state.
pub fn simulate<R: Rng + ?Sized>(
    n: usize,
    p: usize,
    rho: f64,
    beta: ArrayView1<f64>,
    snr: f64,
    rng: &mut R,
) -> Result<SyntheticDataset> {
    SimulationConfig { n, p, rho, snr }.validate()?;

    if beta.len() != p {
        return Err(SimError::dimension_mismatch(
            format!("beta len ({}) != p ({})", beta.len(), p)
        ));
    }

    let covariance = toeplitz_covariance(p, rho);
    let chol = cholesky(covariance.view())?;

    // rows of z are iid N(0, I); z * L' has covariance L L' = Sigma
    let z = Array2::from_shape_fn((n, p), |_| rng.sample::<f64, _>(StandardNormal));
    let x = z.dot(&chol.t());

    let var_mu = beta.dot(&covariance.dot(&beta));
    let sigma = (var_mu / snr).sqrt();

    let noise = Array1::from_shape_fn(n, |_| rng.sample::<f64, _>(StandardNormal));
    let y = x.dot(&beta) + sigma * &noise;

    SyntheticDataset::new(x, y, sigma)
}
