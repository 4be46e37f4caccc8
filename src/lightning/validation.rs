//! Input validation, memo sanitization and the BOLT11 format check.

use unicode_normalization::UnicodeNormalization;

use super::InvoiceRequest;
use crate::error::{codes, ProviderError, ProviderResult};

pub const MIN_AMOUNT_SATS: u64 = 1;
pub const MAX_AMOUNT_SATS: u64 = 1_000_000;
pub const MAX_MEMO_CHARS: usize = 500;
pub const MIN_EXPIRY_SECS: u64 = 60;
pub const MAX_EXPIRY_SECS: u64 = 86_400;
pub const DEFAULT_EXPIRY_SECS: u64 = 3_600;

/// Sent when nothing survives memo sanitization
pub const FALLBACK_MEMO: &str = "DazNode payment";

pub const MIN_INVOICE_LENGTH: usize = 20;
const INVOICE_PREFIXES: [&str; 3] = ["lnbc", "lntb", "lnsb"];

/// Reject requests the wallet backend would refuse, before any network call.
pub fn validate_invoice_request(request: &InvoiceRequest) -> ProviderResult<()> {
    if request.amount < MIN_AMOUNT_SATS {
        return Err(ProviderError::validation(
            codes::INVALID_AMOUNT,
            "Amount must be a positive number of sats",
        ));
    }
    if request.amount > MAX_AMOUNT_SATS {
        return Err(ProviderError::validation(
            codes::INVALID_AMOUNT,
            format!("Amount cannot exceed {} sats", MAX_AMOUNT_SATS),
        ));
    }

    let memo = request.memo.trim();
    if memo.is_empty() {
        return Err(ProviderError::validation(
            codes::INVALID_MEMO,
            "Memo cannot be empty",
        ));
    }
    if memo.chars().count() > MAX_MEMO_CHARS {
        return Err(ProviderError::validation(
            codes::INVALID_MEMO,
            format!("Memo cannot exceed {} characters", MAX_MEMO_CHARS),
        ));
    }

    if let Some(expiry) = request.expiry {
        if !(MIN_EXPIRY_SECS..=MAX_EXPIRY_SECS).contains(&expiry) {
            return Err(ProviderError::validation(
                codes::INVALID_EXPIRY,
                format!(
                    "Expiry must be between {} and {} seconds",
                    MIN_EXPIRY_SECS, MAX_EXPIRY_SECS
                ),
            ));
        }
    }

    Ok(())
}

/// Decompose, drop everything outside ASCII and trim. Accented letters keep
/// their base letter, symbols disappear.
pub fn sanitize_memo(memo: &str) -> String {
    let ascii: String = memo
        .nfkd()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect();
    let trimmed = ascii.trim();

    if trimmed.is_empty() {
        FALLBACK_MEMO.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn validate_payment_hash(payment_hash: &str) -> ProviderResult<()> {
    if payment_hash.trim().is_empty() {
        return Err(ProviderError::validation(
            codes::INVALID_PAYMENT_HASH,
            "Payment hash cannot be empty",
        ));
    }
    if !payment_hash.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProviderError::validation(
            codes::INVALID_PAYMENT_HASH,
            "Payment hash must be alphanumeric",
        ));
    }
    Ok(())
}

/// Cheap structural check on an encoded payment request. Does not decode the
/// bech32 payload.
pub fn is_valid_bolt11_format(payment_request: &str) -> bool {
    if payment_request.len() < MIN_INVOICE_LENGTH {
        return false;
    }

    let lower = payment_request.to_ascii_lowercase();
    INVOICE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
        && payment_request.chars().all(|c| c.is_ascii_alphanumeric())
}
