use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use billseq_core::{InvoiceId, OrderId};
use billseq_infra::store::{InvoiceFilter, InvoiceOrder, InvoiceUpdate, NewInvoice, StoreResult};
use billseq_infra::{
    ConflictRetry, InMemoryInvoiceStore, InvoiceError, InvoiceService, InvoiceStore, RetryOptions,
    retry_with_backoff,
};
use billseq_invoicing::{BackoffPolicy, Invoice};

/// In-memory store that yields to the scheduler before every call, so
/// concurrent assigners interleave between reading the max and writing.
#[derive(Debug, Default)]
struct YieldingStore {
    inner: InMemoryInvoiceStore,
}

#[async_trait]
impl InvoiceStore for YieldingStore {
    async fn list(
        &self,
        filter: InvoiceFilter,
        order: Option<InvoiceOrder>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Invoice>> {
        tokio::task::yield_now().await;
        self.inner.list(filter, order, limit).await
    }

    async fn create(&self, new: NewInvoice) -> StoreResult<Invoice> {
        tokio::task::yield_now().await;
        self.inner.create(new).await
    }

    async fn update(&self, updates: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>> {
        tokio::task::yield_now().await;
        self.inner.update(updates).await
    }

    async fn retrieve(&self, id: InvoiceId) -> StoreResult<Invoice> {
        tokio::task::yield_now().await;
        self.inner.retrieve(id).await
    }

    async fn delete(&self, ids: &[InvoiceId]) -> StoreResult<()> {
        self.inner.delete(ids).await
    }
}

fn backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(5), Duration::from_millis(50)).unwrap()
}

async fn seed(service: &InvoiceService<YieldingStore>, n: usize) -> Vec<InvoiceId> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let order = OrderId::new(format!("order_{i:02}")).unwrap();
        ids.push(service.ensure_pending(&order).await.unwrap().id());
    }
    ids
}

async fn assign_until_done(
    service: Arc<InvoiceService<YieldingStore>>,
    id: InvoiceId,
) -> Result<Invoice, InvoiceError> {
    let options = RetryOptions::new().should_abort(InvoiceError::is_permanent);
    retry_with_backoff(backoff(), options, || {
        let service = Arc::clone(&service);
        async move { service.assign_invoice_number(id).await }
    })
    .await
}

fn sorted_numbers(invoices: &[Invoice]) -> Vec<u64> {
    let mut numbers: Vec<u64> = invoices
        .iter()
        .filter_map(|i| i.invoice_number().map(|n| n.get()))
        .collect();
    numbers.sort_unstable();
    numbers
}

#[tokio::test(start_paused = true)]
async fn ten_concurrent_assigners_produce_one_to_ten() {
    let service = Arc::new(InvoiceService::new(YieldingStore::default()));
    let ids = seed(&service, 10).await;

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| tokio::spawn(assign_until_done(Arc::clone(&service), id)))
        .collect();
    let invoices: Vec<Invoice> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(sorted_numbers(&invoices), (1..=10).collect::<Vec<_>>());
    assert!(service.list_pending().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_races_are_retried_locally_before_surfacing() {
    let service = Arc::new(InvoiceService::new(YieldingStore::default()));
    let ids = seed(&service, 2).await;
    let (first, second) = (ids[0], ids[1]);

    let a = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.assign_invoice_number(first).await }
    });
    let b = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.assign_invoice_number(second).await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(sorted_numbers(&[a, b]), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn racing_on_the_same_invoice_assigns_a_single_number() {
    let service = Arc::new(InvoiceService::new(YieldingStore::default()));
    let ids = seed(&service, 2).await;
    let target = ids[0];

    let racers: Vec<_> = (0..3)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.assign_invoice_number(target).await })
        })
        .collect();
    let results: Vec<Invoice> = join_all(racers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(results.iter().all(|i| i.invoice_number() == results[0].invoice_number()));
    assert_eq!(results[0].invoice_number().map(|n| n.get()), Some(1));

    let next = service.assign_invoice_number(ids[1]).await.unwrap();
    assert_eq!(next.invoice_number().map(|n| n.get()), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gapless_on_a_multi_threaded_runtime() {
    let service = Arc::new(
        InvoiceService::new(YieldingStore::default()).with_conflict_retry(ConflictRetry {
            max_retries: 5,
            step: Duration::from_millis(2),
        }),
    );
    let ids = seed(&service, 25).await;

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| tokio::spawn(assign_until_done(Arc::clone(&service), id)))
        .collect();
    let invoices: Vec<Invoice> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(sorted_numbers(&invoices), (1..=25).collect::<Vec<_>>());
}
