//! Field-level encryption seam.
//!
//! Sensitive text passes through a [`FieldCipher`] on its way into and out
//! of the store facade; the stores never know whether they hold ciphertext.

use crate::error::Result;
use crate::models::EntityId;

pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, value: &str, owner: EntityId) -> Result<String>;

    fn decrypt(&self, value: &str, owner: EntityId) -> Result<String>;
}

/// Stores text as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl FieldCipher for PlaintextCipher {
    fn encrypt(&self, value: &str, _owner: EntityId) -> Result<String> {
        Ok(value.to_string())
    }

    fn decrypt(&self, value: &str, _owner: EntityId) -> Result<String> {
        Ok(value.to_string())
    }
}
