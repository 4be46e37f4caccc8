#[cfg(feature = "api")]
pub mod logging;
pub mod sanitization;

#[cfg(feature = "api")]
pub use logging::{init_logging, LoggingConfig};
pub use sanitization::{sanitize_api_key, sanitize_invoice, sanitize_preimage, Redacted, SecretKind};
