use ndarray::{Array1, ArrayView1};
use crate::error::{SimError, Result};

/// line an estimate up w/ beta - drops a leading intercept if there is one
pub fn align_estimate<'a>(
    estimated: ArrayView1<'a, f64>,
    beta: ArrayView1<f64>,
) -> Result<ArrayView1<'a, f64>> {
    let aligned = if estimated.len() != beta.len() && !estimated.is_empty() {
        estimated.slice_move(ndarray::s![1..])
    } else {
        estimated
    };

    if aligned.len() != beta.len() {
        return Err(SimError::dimension_mismatch(
            format!("estimate len ({}) can't be lined up with beta len ({})",
                   estimated.len(), beta.len())
        ));
    }

    Ok(aligned)
}

/// selected (nonzero) -> 1, dropped -> 0
pub fn binarize(estimated: ArrayView1<f64>) -> Array1<f64> {
    estimated.mapv(|v| if v != 0.0 { 1.0 } else { 0.0 })
}

/// how many strongly significant variables (beta == 1) were kept
pub fn var_retention(estimated: ArrayView1<f64>, beta: ArrayView1<f64>) -> Result<usize> {
    let aligned = align_estimate(estimated, beta)?;
    let selected = binarize(aligned);

    Ok(selected
        .iter()
        .zip(beta.iter())
        .filter(|&(&s, &b)| s == 1.0 && b == 1.0)
        .count())
}

/// how many variables got the right selected/dropped call.
///
/// Compares the 0/1 selection against beta literally, so this is only exact
/// for 0/1 betas: a weak coefficient like 0.25 never matches either call.
pub fn var_identification(estimated: ArrayView1<f64>, beta: ArrayView1<f64>) -> Result<usize> {
    let aligned = align_estimate(estimated, beta)?;
    let selected = binarize(aligned);

    Ok(selected
        .iter()
        .zip(beta.iter())
        .filter(|&(&s, &b)| s == b)
        .count())
}

/// total number of variables the estimator kept
pub fn var_nonzero(estimated: ArrayView1<f64>, beta: ArrayView1<f64>) -> Result<usize> {
    let aligned = align_estimate(estimated, beta)?;
    Ok(binarize(aligned).sum() as usize)
}

/// all three scores at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportScores {
    pub retention: usize,
    pub identification: usize,
    pub nonzero: usize,
}

impl SupportScores {
    pub fn compute(estimated: ArrayView1<f64>, beta: ArrayView1<f64>) -> Result<Self> {
        Ok(Self {
            retention: var_retention(estimated, beta)?,
            identification: var_identification(estimated, beta)?,
            nonzero: var_nonzero(estimated, beta)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_perfect_estimate() {
        let beta = arr1(&[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let scores = SupportScores::compute(beta.view(), beta.view()).unwrap();
        assert_eq!(scores.retention, 4);
        assert_eq!(scores.identification, 6);
        assert_eq!(scores.nonzero, 4);
    }

    #[test]
    fn test_intercept_is_stripped() {
        let beta = arr1(&[1.0, 0.0, 1.0, 0.0, 1.0]);
        let estimated = arr1(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        // aligned: [1, 1, 0, 0, 1]
        assert_eq!(var_retention(estimated.view(), beta.view()).unwrap(), 2);
        assert_eq!(var_identification(estimated.view(), beta.view()).unwrap(), 3);
        assert_eq!(var_nonzero(estimated.view(), beta.view()).unwrap(), 3);
    }

    #[test]
    fn test_nonzero_intercept_is_ignored() {
        let beta = arr1(&[1.0, 0.0, 0.0]);
        let estimated = arr1(&[3.7, 0.0, 0.0, 0.0]);
        assert_eq!(var_nonzero(estimated.view(), beta.view()).unwrap(), 0);
        assert_eq!(var_identification(estimated.view(), beta.view()).unwrap(), 2);
    }

    #[test]
    fn test_coefficient_magnitude_does_not_matter() {
        let beta = arr1(&[1.0, 1.0, 0.0]);
        let estimated = arr1(&[0.02, -4.0, 1e-9]);
        assert_eq!(var_retention(estimated.view(), beta.view()).unwrap(), 2);
        assert_eq!(var_nonzero(estimated.view(), beta.view()).unwrap(), 3);
        assert_eq!(var_identification(estimated.view(), beta.view()).unwrap(), 2);
    }

    #[test]
    fn test_weak_coefficients_never_identified() {
        let beta = arr1(&[1.0, 0.5, 0.25]);
        let estimated = arr1(&[1.0, 1.0, 0.0]);
        // only strongly significant entries count for retention
        assert_eq!(var_retention(estimated.view(), beta.view()).unwrap(), 1);
        assert_eq!(var_identification(estimated.view(), beta.view()).unwrap(), 1);
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let beta = arr1(&[1.0, 0.0, 1.0]);
        let too_long = arr1(&[0.0, 1.0, 0.0, 1.0, 1.0]);
        let too_short = arr1(&[1.0, 0.0]);
        let empty = Array1::<f64>::zeros(0);

        for estimated in [too_long, too_short, empty] {
            let err = var_retention(estimated.view(), beta.view()).unwrap_err();
            assert!(matches!(err, SimError::DimensionMismatch { .. }));
            assert!(var_identification(estimated.view(), beta.view()).is_err());
            assert!(var_nonzero(estimated.view(), beta.view()).is_err());
        }
    }
}
