//! Error types shared by the scoring stages.

use thiserror::Error;

/// Core error type.
///
/// The first four variants describe per-event conditions. A stage that hits one of the
/// recoverable ones records the value as not computable and moves on; `BudgetExceeded`
/// ends the event. `Validation` and `ConfigurationMissing` only occur while building
/// tables and registries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Too few (or too many) input objects for the requested computation
    #[error("insufficient input: {0}")]
    InputInsufficient(String),

    /// No unique assignment of roles to candidate objects exists
    #[error("ambiguous assignment: {0}")]
    AmbiguousAssignment(String),

    /// Factorial enumeration requested above the configured cap
    #[error("combinatoric limit: {n} objects requested, at most {max} allowed")]
    CombinatoricLimit { n: usize, max: usize },

    /// The per-event wall-clock budget ran out
    #[error("per-event time budget exceeded during {0}")]
    BudgetExceeded(String),

    /// Malformed table or parameter
    #[error("validation error: {0}")]
    Validation(String),

    /// A requested table or named configuration is absent
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
}

impl Error {
    /// True when the current event can continue with a fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InputInsufficient(_) | Error::AmbiguousAssignment(_) | Error::CombinatoricLimit { .. }
        )
    }

    /// Counter name under which a recoverable failure is tallied.
    pub fn counter_name(&self) -> &'static str {
        match self {
            Error::InputInsufficient(_) => "input_insufficient",
            Error::AmbiguousAssignment(_) => "ambiguous_assignment",
            Error::CombinatoricLimit { .. } => "combinatoric_limit",
            Error::BudgetExceeded(_) => "budget_exceeded",
            Error::Validation(_) => "validation",
            Error::ConfigurationMissing(_) => "configuration_missing",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(Error::InputInsufficient("x".into()).is_recoverable());
        assert!(Error::CombinatoricLimit { n: 9, max: 8 }.is_recoverable());
        assert!(!Error::ConfigurationMissing("csv_b_Bin0".into()).is_recoverable());
        assert!(!Error::BudgetExceeded("scorer".into()).is_recoverable());
        assert_eq!(Error::BudgetExceeded("scorer".into()).counter_name(), "budget_exceeded");
    }
}
