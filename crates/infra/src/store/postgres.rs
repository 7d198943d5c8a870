//! Postgres-backed invoice store.
//!
//! Uniqueness is enforced by partial unique indexes (see
//! `migrations/0001_create_invoice.sql`); this module only maps their
//! failures onto [`StoreError`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `UniqueViolation` | Order already invoiced, or number taken by a concurrent assigner |
//! | Database (check constraint violation) | `23514` | `Storage` | Row would break the number/status pairing |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! A finalize that matches no pending row is reported as `StaleWrite` (or
//! `NotFound` when the row is gone).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use billseq_core::{InvoiceId, OrderId};
use billseq_invoicing::{Invoice, InvoiceNumber, InvoiceStatus};

use super::{
    InvoiceFilter, InvoiceOrder, InvoiceStore, InvoiceUpdate, NewInvoice, StoreError, StoreResult,
};

const SCHEMA: &str = include_str!("../../migrations/0001_create_invoice.sql");

const COLUMNS: &str =
    "id, invoice_number, order_id, status, created_at, updated_at, deleted_at";

/// Postgres-backed invoice store.
///
/// `Send + Sync`; all operations go through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the invoice table and its indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn list(
        &self,
        filter: InvoiceFilter,
        order: Option<InvoiceOrder>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Invoice>> {
        let order_by = match order.unwrap_or_default() {
            InvoiceOrder::CreatedAsc => "created_at ASC, id ASC",
            InvoiceOrder::NumberDesc => "invoice_number DESC NULLS LAST",
        };
        let limit = limit.map(to_db_limit).transpose()?;

        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM invoice
            WHERE ($1::uuid IS NULL OR id = $1)
                AND ($2::text IS NULL OR order_id = $2)
                AND ($3::text IS NULL OR status = $3)
                AND ($4::boolean OR deleted_at IS NULL)
            ORDER BY {order_by}
            LIMIT $5
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.id.map(Uuid::from))
            .bind(filter.order_id.as_ref().map(OrderId::as_str))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.include_deleted)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        let invoices = rows
            .iter()
            .map(decode_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Span::current().record("row_count", invoices.len());
        Ok(invoices)
    }

    #[instrument(skip(self), fields(order_id = %new.order_id), err)]
    async fn create(&self, new: NewInvoice) -> StoreResult<Invoice> {
        let sql = format!(
            r#"
            INSERT INTO invoice (id, order_id, status, invoice_number)
            VALUES ($1, $2, 'pending', NULL)
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::from(InvoiceId::new()))
            .bind(new.order_id.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create", e))?;

        decode_row(&row)
    }

    #[instrument(skip(self, updates), fields(update_count = updates.len()), err)]
    async fn update(&self, updates: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>> {
        if updates.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            r#"
            UPDATE invoice
            SET invoice_number = $2, status = 'created', updated_at = now()
            WHERE id = $1 AND status = 'pending' AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut updated = Vec::with_capacity(updates.len());
        for u in updates {
            let number = i64::try_from(u.invoice_number.get()).map_err(|_| {
                StoreError::Storage(format!("invoice number {} out of range", u.invoice_number))
            })?;

            let row = sqlx::query(&sql)
                .bind(Uuid::from(u.id))
                .bind(number)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update", e))?;

            match row {
                Some(row) => updated.push(decode_row(&row)?),
                None => {
                    // Distinguish "gone" from "someone else finalized it".
                    let exists = sqlx::query(
                        "SELECT 1 FROM invoice WHERE id = $1 AND deleted_at IS NULL",
                    )
                    .bind(Uuid::from(u.id))
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_probe", e))?
                    .is_some();

                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;

                    return Err(if exists {
                        StoreError::StaleWrite(format!("invoice {} is no longer pending", u.id))
                    } else {
                        StoreError::NotFound(u.id.to_string())
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(updated)
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    async fn retrieve(&self, id: InvoiceId) -> StoreResult<Invoice> {
        let sql = format!("SELECT {COLUMNS} FROM invoice WHERE id = $1 AND deleted_at IS NULL");

        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("retrieve", e))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        decode_row(&row)
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()), err)]
    async fn delete(&self, ids: &[InvoiceId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        sqlx::query(
            r#"
            UPDATE invoice
            SET deleted_at = now(), updated_at = now()
            WHERE id = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(ids)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;

        Ok(())
    }
}

fn to_db_limit(limit: usize) -> StoreResult<i64> {
    i64::try_from(limit).map_err(|_| StoreError::Storage(format!("limit {limit} out of range")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> StoreResult<Invoice> {
    let row = InvoiceRow::from_row(row)
        .map_err(|e| StoreError::Storage(format!("failed to deserialize invoice row: {}", e)))?;
    row.try_into()
}

// SQLx row types

#[derive(Debug)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: Option<i64>,
    order_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for InvoiceRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceRow {
            id: row.try_get("id")?,
            invoice_number: row.try_get("invoice_number")?,
            order_id: row.try_get("order_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let corrupt = |e: billseq_core::DomainError| {
            StoreError::Storage(format!("corrupt invoice row {}: {}", row.id, e))
        };

        let invoice_number = row
            .invoice_number
            .map(|n| {
                u64::try_from(n)
                    .map_err(|_| billseq_core::DomainError::validation("negative invoice number"))
                    .and_then(InvoiceNumber::new)
            })
            .transpose()
            .map_err(corrupt)?;
        let status: InvoiceStatus = row.status.parse().map_err(corrupt)?;
        let order_id = OrderId::new(row.order_id.clone()).map_err(corrupt)?;

        Invoice::restore(
            InvoiceId::from_uuid(row.id),
            order_id,
            invoice_number,
            status,
            row.created_at,
            row.updated_at,
            row.deleted_at,
        )
        .map_err(corrupt)
    }
}
