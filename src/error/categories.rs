use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // Client errors
    ValidationError,
    NotFound,

    // Provider errors
    ProviderUnavailable,
    ProviderTimeout,
    ProviderError,
    InvalidProviderResponse,

    // System errors
    ConfigurationError,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCategory {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::ProviderUnavailable | Self::ServiceUnavailable => 503,
            Self::ProviderTimeout => 504,
            Self::ProviderError | Self::InvalidProviderResponse => 502,
            Self::ConfigurationError | Self::InternalError => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InvalidProviderResponse => "INVALID_PROVIDER_RESPONSE",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ValidationError | Self::NotFound)
    }

    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code())
    }
}
