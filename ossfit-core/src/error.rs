use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitError {
    /// A form field could not be turned into a hardware value.
    #[error("Invalid {field} '{value}': {reason}")]
    Validation {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown GPU '{0}'")]
    Lookup(String),

    #[error("Catalog error: {0}")]
    Configuration(String),
}

impl FitError {
    pub fn validation(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        FitError::Validation {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FitError::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, FitError>;
