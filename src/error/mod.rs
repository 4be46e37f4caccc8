use std::fmt;

pub mod categories;
#[cfg(feature = "api")]
pub mod response;

pub use categories::ErrorCategory;
#[cfg(feature = "api")]
pub use response::AppError;


/// Machine-readable error codes carried by [`ProviderError`]
pub mod codes {
    pub const INVALID_AMOUNT: &str = "INVALID_AMOUNT";
    pub const INVALID_MEMO: &str = "INVALID_MEMO";
    pub const INVALID_EXPIRY: &str = "INVALID_EXPIRY";
    pub const INVALID_PAYMENT_HASH: &str = "INVALID_PAYMENT_HASH";
    pub const MISSING_API_KEY: &str = "MISSING_API_KEY";
    pub const INVALID_ENDPOINT: &str = "INVALID_ENDPOINT";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    pub const INVALID_INVOICE: &str = "INVALID_INVOICE";
    pub const MAX_RETRIES_EXCEEDED: &str = "MAX_RETRIES_EXCEEDED";
    pub const PAYMENT_NOT_FOUND: &str = "PAYMENT_NOT_FOUND";
    pub const NO_PROVIDER_AVAILABLE: &str = "NO_PROVIDER_AVAILABLE";
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Bad caller input, never retried
    Validation,
    /// Provider could not be constructed from its configuration
    Configuration,
    /// Non-2xx HTTP response, network failure or timeout
    Transport,
    /// Success response that is missing fields or carries a malformed invoice
    ResponseShape,
    /// All attempts failed, wraps the last underlying error
    ExhaustedRetries,
    /// Payment lookup for an unknown hash
    NotFound,
    /// No provider is registered to serve the request
    Unavailable,
}

impl ProviderErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::ResponseShape)
    }
}

/// Error returned by invoice providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub code: Option<&'static str>,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Validation, message).with_code(code)
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message).with_code(code)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
            .with_code(codes::HTTP_ERROR)
            .with_status(status)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message).with_code(codes::NETWORK_ERROR)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message).with_code(codes::TIMEOUT)
    }

    pub fn response_shape(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ResponseShape, message).with_code(code)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
            .with_code(codes::PAYMENT_NOT_FOUND)
            .with_status(404)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message).with_code(codes::NO_PROVIDER_AVAILABLE)
    }

    /// Wrap the last failure after every attempt has been used up
    pub fn exhausted(attempts: u32, last: &ProviderError) -> Self {
        Self {
            kind: ProviderErrorKind::ExhaustedRetries,
            message: format!(
                "Failed to generate invoice after {} attempts: {}",
                attempts, last.message
            ),
            code: Some(codes::MAX_RETRIES_EXCEEDED),
            status: last.status,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ProviderErrorKind::Validation => ErrorCategory::ValidationError,
            ProviderErrorKind::NotFound => ErrorCategory::NotFound,
            ProviderErrorKind::Configuration => ErrorCategory::ConfigurationError,
            ProviderErrorKind::ExhaustedRetries => ErrorCategory::ProviderUnavailable,
            ProviderErrorKind::Unavailable => ErrorCategory::ServiceUnavailable,
            ProviderErrorKind::ResponseShape => ErrorCategory::InvalidProviderResponse,
            ProviderErrorKind::Transport if self.code == Some(codes::TIMEOUT) => {
                ErrorCategory::ProviderTimeout
            }
            ProviderErrorKind::Transport => ErrorCategory::ProviderError,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.status) {
            (Some(code), Some(status)) => write!(f, "{} ({}, HTTP {})", self.message, code, status),
            (Some(code), None) => write!(f, "{} ({})", self.message, code),
            (None, Some(status)) => write!(f, "{} (HTTP {})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}
