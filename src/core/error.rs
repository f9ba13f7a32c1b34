use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors surfaced by the projector. Every variant is fatal to the call that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// An input field violates its constraint. `field` uses the camelCase name callers send.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// A path value left the representable positive range.
    #[error("numeric overflow on path {path} at step {step}")]
    NumericOverflow { path: u32, step: u32 },
}

impl ProjectionError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }

    /// Field name for configuration errors, `None` otherwise.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration { field, .. } => Some(field),
            Self::NumericOverflow { .. } => None,
        }
    }
}
