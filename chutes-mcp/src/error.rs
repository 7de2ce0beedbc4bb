use thiserror::Error;

/// Failure of a tool call, reported to the client as an `is_error` result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Missing credentials or endpoints. Raised before any network I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Arguments outside their published bounds.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection failures, timeouts and non-2xx replies from the backend.
    #[error("Error calling Chutes API: {0}")]
    Transport(String),

    /// The backend answered 2xx with a body we could not understand.
    #[error("Error parsing response from Chutes API: {0}")]
    Parse(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Fails with `InvalidArgument` unless `min <= value <= max`.
pub fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ToolError::InvalidArgument(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Fails with `InvalidArgument` unless `value >= min`.
pub fn check_min<T>(name: &str, value: T, min: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min {
        return Err(ToolError::InvalidArgument(format!(
            "{} must be at least {}, got {}",
            name, min, value
        )));
    }
    Ok(())
}
