//! Forecast error types.

use serde::Serialize;
use thiserror::Error;

/// Why caller-supplied input was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("malformed value: {0}")]
    Malformed(String),

    #[error("coordinates out of range: {lat}, {lon}")]
    OutOfRange { lat: f64, lon: f64 },

    #[error("address is empty")]
    EmptyAddress,
}

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Could not determine city and state for this location")]
    LocationUndetermined,
}

impl ForecastError {
    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(InputError::OutOfRange { .. }) => "Coordinates are out of range.",
            Self::InvalidInput(InputError::EmptyAddress) => "Enter an address or ZIP code.",
            Self::InvalidInput(InputError::Malformed(_)) => "Enter valid decimal coordinates.",
            Self::Upstream { .. } | Self::InvalidResponse(_) => {
                "An upstream service returned an error. Please try again later."
            }
            Self::Unreachable(_) => "Could not reach an upstream service. Check your connection.",
            Self::NotFound(_) => "No results found for that address or ZIP code.",
            Self::LocationUndetermined => "Could not determine city and state for this location.",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

/// Optional part of a forecast that could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Hourly,
    Alerts,
}

/// Non-fatal failure attached to a successful forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialDegradation {
    pub section: Section,
    pub message: String,
}

impl PartialDegradation {
    pub fn new(section: Section, error: &ForecastError) -> Self {
        let message = match (section, error) {
            (_, ForecastError::Unreachable(_)) => "Could not reach api.weather.gov.",
            (Section::Hourly, _) => "Hourly forecast unavailable.",
            (Section::Alerts, _) => "Alerts unavailable.",
        };
        Self {
            section,
            message: message.to_string(),
        }
    }

    pub fn missing(section: Section) -> Self {
        let message = match section {
            Section::Hourly => "Hourly forecast unavailable.",
            Section::Alerts => "Alerts unavailable.",
        };
        Self {
            section,
            message: message.to_string(),
        }
    }
}
