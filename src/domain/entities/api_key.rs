//! Backend API key value object.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// API key for the hosted backend, masked in logs and wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey {
    value: String,
}

impl ApiKey {
    const MIN_KEY_LENGTH: usize = 20;

    /// Creates a key after trimming, rejecting obviously truncated input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();

        if value.len() < Self::MIN_KEY_LENGTH || value.chars().any(char::is_whitespace) {
            return None;
        }

        Some(Self { value })
    }

    /// Creates key without validation.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Raw key, for request headers only.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns masked key for display.
    #[must_use]
    pub fn masked(&self) -> String {
        if self.value.len() <= 10 {
            return "*".repeat(self.value.len());
        }

        let visible_prefix = &self.value[..4];
        let visible_suffix = &self.value[self.value.len() - 4..];
        format!("{visible_prefix}...{visible_suffix}")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &self.masked())
            .finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_key() -> String {
        "sb_publishable_0123456789abcdefXYZ".to_string()
    }

    #[test]
    fn test_valid_key_creation() {
        assert!(ApiKey::new(format!("  {}\n", make_valid_key())).is_some());
    }

    #[test]
    fn test_invalid_key_too_short() {
        assert!(ApiKey::new("short").is_none());
    }

    #[test]
    fn test_invalid_key_with_inner_whitespace() {
        assert!(ApiKey::new("abcdefghij klmnopqrstuv").is_none());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = ApiKey::new_unchecked(make_valid_key());
        let debug_output = format!("{key:?}");

        assert!(debug_output.contains("..."));
        assert!(!debug_output.contains(&make_valid_key()));
    }
}
