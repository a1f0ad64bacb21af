/// Reasons a quadratic trend could not be fitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    /// A degree-2 fit needs at least three points.
    #[error("Forecast: need at least 3 points to fit a quadratic, have {have}")]
    NotEnoughPoints { have: usize },

    /// The normal equations have no unique solution, or the solution is not finite.
    #[error("Forecast: singular system while fitting the trend")]
    Singular,
}

/// Errors raised while feeding samples through the engine.
///
/// None of these are fatal: the engine logs them and keeps going with the
/// next sample.
///
/// # Examples
///
/// ```rust
/// use printwatch_alert::error::EngineError;
///
/// let err = EngineError::InsufficientData { have: 12, need: 60 };
/// assert!(err.to_string().contains("12"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The window has not filled up to the configured minimum yet.
    #[error("Engine: not enough data yet ({have} samples, need {need})")]
    InsufficientData { have: usize, need: usize },

    /// The sample was dropped (non-finite value, or too far out of order).
    #[error("Engine: invalid sample: {0}")]
    InvalidSample(String),

    /// The trend could not be fitted for this tick.
    #[error("Engine: forecast fit failed: {0}")]
    ForecastFitFailure(#[from] ForecastError),

    /// The configuration cannot be used to build an engine.
    #[error("Engine: invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
