use thiserror::Error;

use crate::core::types::Time;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate variable name: {0}")]
    DuplicateName(String),

    #[error("Time {requested} precedes lower bound {bound}")]
    TimeOrderViolation { requested: Time, bound: Time },

    #[error("Invalid time: {0}")]
    InvalidTime(Time),

    #[error("Variable {name} never reaches {target}")]
    Unreachable { name: String, target: f64 },

    #[error("Variable is not linear: {0}")]
    NotLinear(String),

    #[error("Variable {name} has min {min} above max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("Cannot purchase {name}: {reason}")]
    PurchaseRejected { name: String, reason: String },

    #[error("Replay pass exceeded {0} steps")]
    ReplayLimit(usize),

    #[error("Time {requested} lies beyond the replayed horizon {horizon}")]
    BeyondHorizon { requested: Time, horizon: Time },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Reject NaN and infinite times at API boundaries
pub fn ensure_finite(t: Time) -> Result<Time> {
    if t.is_finite() {
        Ok(t)
    } else {
        Err(EngineError::InvalidTime(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite(3.5).unwrap(), 3.5);
        assert!(matches!(
            ensure_finite(f64::NAN),
            Err(EngineError::InvalidTime(_))
        ));
        assert!(matches!(
            ensure_finite(f64::INFINITY),
            Err(EngineError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::TimeOrderViolation {
            requested: 1.0,
            bound: 2.0,
        };
        assert_eq!(err.to_string(), "Time 1 precedes lower bound 2");
        assert_eq!(
            EngineError::NotFound("Wood".into()).to_string(),
            "Not found: Wood"
        );
    }
}
