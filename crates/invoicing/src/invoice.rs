use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billseq_core::{DomainError, DomainResult, InvoiceId, OrderId};

/// Invoice status lifecycle.
///
/// The only transition is `Pending -> Created`; it never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Created,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Created => "created",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "created" => Ok(InvoiceStatus::Created),
            other => Err(DomainError::validation(format!(
                "unknown invoice status '{other}'"
            ))),
        }
    }
}

/// A position in the gapless invoice sequence. Always `>= 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct InvoiceNumber(u64);

impl InvoiceNumber {
    pub fn new(value: u64) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("invoice number must be >= 1"));
        }
        Ok(Self(value))
    }

    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Candidate for the next assignment given the current maximum, if any.
    pub fn following(current_max: Option<InvoiceNumber>) -> Self {
        current_max.map_or_else(Self::first, Self::next)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for InvoiceNumber {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InvoiceNumber> for u64 {
    fn from(value: InvoiceNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice record.
///
/// Invariants:
/// - `invoice_number` is set iff `status == Created`
/// - once set, the number never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    order_id: OrderId,
    invoice_number: Option<InvoiceNumber>,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// A freshly bootstrapped placeholder for `order_id`.
    pub fn pending(id: InvoiceId, order_id: OrderId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            order_id,
            invoice_number: None,
            status: InvoiceStatus::Pending,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    /// Rebuild an invoice from persisted columns, rejecting rows that break
    /// the number/status pairing.
    pub fn restore(
        id: InvoiceId,
        order_id: OrderId,
        invoice_number: Option<InvoiceNumber>,
        status: InvoiceStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        match (status, invoice_number) {
            (InvoiceStatus::Pending, None) | (InvoiceStatus::Created, Some(_)) => {}
            (InvoiceStatus::Pending, Some(n)) => {
                return Err(DomainError::invariant(format!(
                    "pending invoice {id} carries number {n}"
                )));
            }
            (InvoiceStatus::Created, None) => {
                return Err(DomainError::invariant(format!(
                    "created invoice {id} has no number"
                )));
            }
        }

        Ok(Self {
            id,
            order_id,
            invoice_number,
            status,
            created_at,
            updated_at,
            deleted_at,
        })
    }

    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn invoice_number(&self) -> Option<InvoiceNumber> {
        self.invoice_number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_finalized(&self) -> bool {
        self.status == InvoiceStatus::Created && self.invoice_number.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// `Pending -> Created` with `number`.
    ///
    /// Fails if the invoice already carries a number; the caller decides
    /// whether that is a conflict or a no-op.
    pub fn finalize(&mut self, number: InvoiceNumber, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == InvoiceStatus::Created {
            return Err(DomainError::invariant(format!(
                "invoice {} already numbered",
                self.id
            )));
        }
        if self.is_deleted() {
            return Err(DomainError::NotFound);
        }

        self.invoice_number = Some(number);
        self.status = InvoiceStatus::Created;
        self.updated_at = at;
        Ok(())
    }

    /// Mark as deleted. Idempotent: the first deletion time is kept.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(at);
            self.updated_at = at;
        }
    }
}
