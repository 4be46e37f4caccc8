use std::fmt;

/// Characters kept at each end of a partially redacted value
const VISIBLE_CHARS: usize = 6;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// BOLT11 payment request
    Invoice,
    /// Settlement proof for a paid invoice
    Preimage,
    /// Wallet API key, never partially shown
    ApiKey,
}

impl SecretKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Invoice => "INVOICE",
            Self::Preimage => "PREIMAGE",
            Self::ApiKey => "API_KEY",
        }
    }

    fn visible_chars(&self) -> usize {
        match self {
            Self::ApiKey => 0,
            Self::Invoice | Self::Preimage => VISIBLE_CHARS,
        }
    }
}

/// Wraps a value so that `Display` and `Debug` only ever show a redacted form
#[derive(Clone)]
pub struct Redacted<T> {
    value: T,
    kind: SecretKind,
}

impl<T: fmt::Display> Redacted<T> {
    pub fn new(value: T, kind: SecretKind) -> Self {
        Self { value, kind }
    }

    fn render(&self) -> String {
        let original = self.value.to_string();
        let visible = self.kind.visible_chars();

        let len = original.len();
        if visible == 0 || len <= visible * 2 || !original.is_ascii() {
            return format!("[REDACTED_{}]", self.kind.label());
        }

        format!(
            "{}[REDACTED_{}_{}_CHARS]{}",
            &original[..visible],
            self.kind.label(),
            len - visible * 2,
            &original[len - visible..]
        )
    }
}

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<T: fmt::Display> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.render())
    }
}

pub fn sanitize_invoice<T: fmt::Display>(invoice: T) -> Redacted<T> {
    Redacted::new(invoice, SecretKind::Invoice)
}

pub fn sanitize_preimage<T: fmt::Display>(preimage: T) -> Redacted<T> {
    Redacted::new(preimage, SecretKind::Preimage)
}

pub fn sanitize_api_key<T: fmt::Display>(key: T) -> Redacted<T> {
    Redacted::new(key, SecretKind::ApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_sanitization() {
        let invoice = "lnbc1u1p3xnhl2pp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqypqdq5xysxxatsyp3k7enxv4jsxqzpuaxtlgmg8d";
        let result = sanitize_invoice(invoice).to_string();

        assert!(result.starts_with("lnbc1u"));
        assert!(result.ends_with("lgmg8d"));
        assert!(result.contains("[REDACTED_INVOICE_"));
        assert!(!result.contains("qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqypqdq5"));
    }

    #[test]
    fn test_short_preimage_fully_redacted() {
        assert_eq!(sanitize_preimage("abc").to_string(), "[REDACTED_PREIMAGE]");
    }

    #[test]
    fn test_api_key_never_partially_shown() {
        let key = "f2a9c7e4b1d84f7aa3c5e6b7d8f9a0b1";
        assert_eq!(sanitize_api_key(key).to_string(), "[REDACTED_API_KEY]");
        assert_eq!(format!("{:?}", sanitize_api_key(key)), "\"[REDACTED_API_KEY]\"");
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let preimage = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let debug = format!("{:?}", Some(sanitize_preimage(preimage)));
        assert!(debug.contains("[REDACTED_PREIMAGE_52_CHARS]"));
        assert!(!debug.contains(preimage));
    }
}
