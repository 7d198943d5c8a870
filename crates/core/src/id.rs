//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Prefix carried by every externally visible order identifier.
pub const ORDER_ID_PREFIX: &str = "order_";

/// Number of alphanumeric characters following [`ORDER_ID_PREFIX`].
pub const ORDER_ID_BODY_LEN: usize = 26;

/// Identifier of an invoice record.
///
/// Assigned once at creation and never changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(Uuid);

impl InvoiceId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for InvoiceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<InvoiceId> for Uuid {
    fn from(value: InvoiceId) -> Self {
        value.0
    }
}

impl FromStr for InvoiceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("InvoiceId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Reference to the order an invoice belongs to.
///
/// Orders are owned by another system, so internally any non-blank reference
/// is accepted (`OrderId::new`). Values arriving through the public query
/// surface go through `FromStr`, which enforces the strict
/// `order_<26 alphanumerics>` shape before anything touches the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wrap an order reference delivered by a trusted source (events, jobs).
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_id("OrderId: must not be blank"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` has the public `order_<26 alphanumerics>` shape.
    pub fn is_well_formed(s: &str) -> bool {
        match s.strip_prefix(ORDER_ID_PREFIX) {
            Some(body) => {
                body.len() == ORDER_ID_BODY_LEN && body.bytes().all(|b| b.is_ascii_alphanumeric())
            }
            None => false,
        }
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_well_formed(s) {
            return Err(DomainError::invalid_id(format!(
                "OrderId: expected '{ORDER_ID_PREFIX}' followed by {ORDER_ID_BODY_LEN} alphanumeric characters"
            )));
        }
        Ok(Self(s.to_string()))
    }
}
