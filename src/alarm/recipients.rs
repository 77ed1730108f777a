use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::NotifyError;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern should compile")
});

/// Ordered, de-duplicated list of lower-cased email addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientList {
    addresses: Vec<String>,
}

impl RecipientList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, normalize and append an address.
    pub fn add(&mut self, address: &str) -> Result<(), NotifyError> {
        let trimmed = address.trim();
        if trimmed.is_empty() || !is_valid_address(trimmed) {
            return Err(NotifyError::InvalidRecipient {
                address: address.to_string(),
            });
        }

        let normalized = trimmed.to_lowercase();
        if self.addresses.contains(&normalized) {
            return Err(NotifyError::DuplicateRecipient {
                address: normalized,
            });
        }

        self.addresses.push(normalized);
        Ok(())
    }

    /// Remove an address; returns whether it was present.
    pub fn remove(&mut self, address: &str) -> bool {
        let normalized = address.trim().to_lowercase();
        let before = self.addresses.len();
        self.addresses.retain(|existing| existing != &normalized);
        self.addresses.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.addresses
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.addresses.clone()
    }
}

fn is_valid_address(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}
