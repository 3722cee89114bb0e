//! Unified error handling for the trip geodata engine.
//!
//! Ingestion failures (`Parse`, `Validation`) abort the pipeline and are
//! reported once to the presentation layer. Geocoding failures never abort an
//! interaction: the caller degrades to manual place-name entry, guided by
//! [`TripDataError::fallback`].

use thiserror::Error;

/// Unified error type for trip geodata operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TripDataError {
    /// Malformed or empty track input
    #[error("Track could not be parsed: {message}")]
    Parse { message: String },

    /// Coordinates outside the valid WGS84 range
    #[error("Invalid coordinates ({latitude}, {longitude}): {message}")]
    Validation {
        latitude: f64,
        longitude: f64,
        message: String,
    },

    /// Reverse geocoding request exceeded its time budget
    #[error("Geocoding request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Provider answered HTTP 429
    #[error("Geocoding provider rate limit exceeded")]
    RateLimit,

    /// Provider body could not be understood
    #[error("Geocoding response could not be parsed: {message}")]
    GeocodeParse { message: String },

    /// Provider answered but knows no place at these coordinates
    #[error("No place found at ({latitude}, {longitude})")]
    GeocodeNotFound { latitude: f64, longitude: f64 },

    /// Transport failure or unexpected HTTP status
    #[error("Network error{}: {message}", .status_code.map(|c| format!(" ({})", c)).unwrap_or_default())]
    Network {
        message: String,
        status_code: Option<u16>,
    },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// What the presentation layer should offer after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Let the user retry the same action later
    Retry,
    /// Let the user type the place name by hand
    ManualEntry,
    /// The input itself must be corrected (different file, different point)
    FixInput,
}

impl TripDataError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        TripDataError::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        TripDataError::Config {
            message: message.into(),
        }
    }

    /// True for failures that may succeed if the user retries later.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TripDataError::Timeout { .. }
                | TripDataError::RateLimit
                | TripDataError::Network { .. }
        )
    }

    /// True for failures of the reverse geocoding subsystem.
    pub fn is_geocoding(&self) -> bool {
        matches!(
            self,
            TripDataError::Timeout { .. }
                | TripDataError::RateLimit
                | TripDataError::GeocodeParse { .. }
                | TripDataError::GeocodeNotFound { .. }
                | TripDataError::Network { .. }
        )
    }

    /// The deterministic, user-actionable fallback for this failure.
    pub fn fallback(&self) -> Fallback {
        match self {
            TripDataError::Parse { .. }
            | TripDataError::Validation { .. }
            | TripDataError::Config { .. } => Fallback::FixInput,
            e if e.is_retriable() => Fallback::Retry,
            _ => Fallback::ManualEntry,
        }
    }

    /// A short message safe to show to end users.
    ///
    /// Never includes provider payloads or internal details.
    pub fn user_message(&self) -> &'static str {
        match self {
            TripDataError::Parse { .. } => "This track file could not be read.",
            TripDataError::Validation { .. } => "The selected location is not valid.",
            TripDataError::Timeout { .. } => {
                "Looking up the place name took too long. Try again or enter it manually."
            }
            TripDataError::RateLimit => {
                "Too many place lookups right now. Try again shortly or enter the name manually."
            }
            TripDataError::GeocodeParse { .. } | TripDataError::Network { .. } => {
                "The place name could not be looked up. Enter it manually."
            }
            TripDataError::GeocodeNotFound { .. } => {
                "No place name is known here. Enter it manually."
            }
            TripDataError::Config { .. } => "The map engine is misconfigured.",
        }
    }
}

/// Result type alias for trip geodata operations.
pub type Result<T> = std::result::Result<T, TripDataError>;

/// Extension trait for converting Option to TripDataError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error.
    fn ok_or_parse(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TripDataError::parse(message))
    }
}
