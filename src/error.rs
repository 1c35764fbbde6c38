use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("dimensions don't match: {message}")]
    DimensionMismatch { message: String },

    #[error("nothing left to average: {message}")]
    AllMissing { message: String },

    #[error("optimization blew up: {message}")]
    OptimizationFailed { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("couldn't build worker pool: {message}")]
    ThreadPool { message: String },

    #[error("couldn't write output: {message}")]
    Output { message: String },
}

impl SimError {
    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::DimensionMismatch { message: message.into() }
    }

    pub fn all_missing(message: impl Into<String>) -> Self {
        Self::AllMissing { message: message.into() }
    }

    pub fn optimization_failed(message: impl Into<String>) -> Self {
        Self::OptimizationFailed { message: message.into() }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn thread_pool(message: impl Into<String>) -> Self {
        Self::ThreadPool { message: message.into() }
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output { message: message.into() }
    }
}

impl From<csv::Error> for SimError {
    fn from(err: csv::Error) -> Self {
        Self::output(err.to_string())
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::output(err.to_string())
    }
}
