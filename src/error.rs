//! Error types for tapir

use thiserror::Error;

/// Result type for tapir operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tapir
///
/// "Element not found" is deliberately absent: locators and matchers report
/// misses as `Ok(None)` or an empty vec, and the retry machinery in
/// [`crate::state`] consumes those as normal values. Only structurally
/// invalid input (corrupt image, corrupt tree) or an unreachable device is
/// an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Screenshot or template bytes could not be decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// UI tree snapshot could not be parsed
    #[error("Tree parse error: {0}")]
    TreeParse(String),

    /// Device transport failure (fatal for the current step)
    #[error("Device unavailable: {context}")]
    DeviceUnavailable {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Click was issued but no page transition was observed
    #[error("Click verification failed after {attempts} attempts")]
    ClickVerification { attempts: u32 },

    /// A bounded retry policy ran out of attempts
    #[error("Step '{step}' failed after {attempts} attempts (last state: {last_state})")]
    StepFailed {
        step: String,
        attempts: u32,
        last_state: String,
    },

    /// Serialization error (persisted cache file)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a device error with context
    pub fn device(context: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            context: context.into(),
            source: None,
        }
    }

    /// Create a device error with IO source
    pub fn device_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::DeviceUnavailable {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a step failure with full context
    pub fn step_failed(
        step: impl Into<String>,
        attempts: u32,
        last_state: impl Into<String>,
    ) -> Self {
        Self::StepFailed {
            step: step.into(),
            attempts,
            last_state: last_state.into(),
        }
    }

    /// Check whether this error aborts the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DeviceUnavailable { .. })
    }
}
