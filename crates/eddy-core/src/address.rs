//! Account and pool address normalization.
//!
//! Settlement-chain addresses are `0x` followed by 40 hex characters. They are
//! compared case-insensitively, so every address is lowercased on ingestion and
//! all maps in the pipeline are keyed by the canonical form.

use crate::error::AddressError;

/// Number of hex characters after the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// Validate `raw` and return its canonical lowercase form.
pub fn normalize_address(raw: &str) -> Result<String, AddressError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(AddressError::MissingPrefix)?;
    if body.len() != ADDRESS_HEX_LEN {
        return Err(AddressError::InvalidLength(body.len()));
    }
    if let Some(c) = body.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidCharacter(c));
    }
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Returns `true` if `raw` is a well-formed address.
pub fn is_valid_address(raw: &str) -> bool {
    normalize_address(raw).is_ok()
}

/// Canonical key for an account that may not be a settlement-chain address.
///
/// Vote records identify voters by public key, which is usually but not always
/// a hex address. Hex-looking keys are lowercased, anything else is kept
/// verbatim. Returns `None` for blank input.
pub fn account_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match normalize_address(trimmed) {
        Ok(addr) => Some(addr),
        Err(_) => Some(trimmed.to_string()),
    }
}
