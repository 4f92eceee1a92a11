//! Error types for terraclass

use thiserror::Error;

/// Main error type for terraclass operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Bands of one stack do not share the same grid
    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Rejected configuration value (palette length, stream bound, thresholds, ...)
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Input with nothing to analyse: no valid pixels, or zero total variance
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// A feature column is constant, so it cannot be standardized
    #[error("Feature {band} has zero variance and cannot be standardized")]
    ConstantBand { band: usize },

    #[error("Not enough samples: {required} required, {available} available")]
    InsufficientSamples { required: usize, available: usize },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for terraclass operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_message() {
        let err = Error::invalid_parameter("tolerance", -1.0, "must be > 0");
        assert_eq!(err.to_string(), "Invalid parameter: tolerance = -1 (must be > 0)");
    }

    #[test]
    fn insufficient_samples_message() {
        let err = Error::InsufficientSamples { required: 6, available: 4 };
        assert!(err.to_string().contains("6 required"));
    }
}
