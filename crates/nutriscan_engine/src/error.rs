//! Error types for the nutrition engine.

use thiserror::Error;

/// Engine errors. None of these are fatal; each maps to a retriable UI state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("API error: {0}")]
    Api(#[from] nutriscan_client::NutritionApiError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The session is absent or still resolving.
    #[error("not authenticated")]
    Unauthenticated,

    /// The remote store rejected the token; the session has been logged out.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("summary unavailable: {0}")]
    SummaryUnavailable(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
