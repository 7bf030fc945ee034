use std::error::Error;

use thiserror::Error;

/// Configuration rejected before any plot state is created
#[derive(Error, Debug, PartialEq)]
pub enum PlotConfigError {
    #[error("capacity must be at least 2, got {0}")]
    CapacityTooSmall(usize),

    #[error("capacity must be even, got {0}")]
    OddCapacity(usize),

    #[error("update period must be a finite number of seconds >= 0, got {0}")]
    InvalidUpdatePeriod(f64),
}

/// Rejected sample batch
///
/// A failed call leaves every series untouched, the whole batch is
/// validated before any state changes.
#[derive(Error, Debug, PartialEq)]
pub enum SampleRecordError {
    #[error("`{0}` is a reserved key and is not supported, supply `step` instead")]
    UnsupportedKey(String),

    #[error("value for series `{series}` must be finite, got {value}")]
    NonFiniteValue { series: String, value: f64 },

    #[error("`step` must be a finite non-negative integer value, got {0}")]
    InvalidStep(f64),
}

/// Failure reported by a snapshot sink collaborator
#[derive(Error, Debug)]
pub enum EmitError {
    // Allows returning any error that supports the Error trait
    #[error(transparent)]
    Dynamic(#[from] Box<dyn Error>),
}

impl From<std::io::Error> for EmitError {
    fn from(value: std::io::Error) -> Self {
        EmitError::Dynamic(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn can_be_created_from_io_error() {
        let _error: EmitError = Error::from(ErrorKind::InvalidData).into();
    }

    #[test]
    fn describes_invalid_capacity() {
        assert_eq!(
            PlotConfigError::OddCapacity(5).to_string(),
            "capacity must be even, got 5"
        );
    }

    #[test]
    fn describes_reserved_key() {
        assert_eq!(
            SampleRecordError::UnsupportedKey("epoch".to_owned()).to_string(),
            "`epoch` is a reserved key and is not supported, supply `step` instead"
        );
    }
}
