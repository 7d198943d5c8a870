use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use billseq_core::{InvoiceId, OrderId};
use billseq_infra::{InMemoryInvoiceStore, InvoiceConfig, InvoiceService, RetryPendingInvoices};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

/// Service holding `numbered` created invoices plus one pending invoice.
fn service_with_history(
    rt: &Runtime,
    numbered: usize,
) -> (Arc<InvoiceService<InMemoryInvoiceStore>>, InvoiceId) {
    rt.block_on(async {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        for i in 0..numbered {
            let order = OrderId::new(format!("order_hist_{i}")).unwrap();
            let pending = service.ensure_pending(&order).await.unwrap();
            service.assign_invoice_number(pending.id()).await.unwrap();
        }
        let pending = service
            .ensure_pending(&OrderId::new("order_target").unwrap())
            .await
            .unwrap();
        (service, pending.id())
    })
}

fn bench_assignment_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("assignment_latency");
    let rt = runtime();

    for numbered in [0usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(numbered), &numbered, |b, &numbered| {
            b.iter_batched(
                || service_with_history(&rt, numbered),
                |(service, id)| {
                    rt.block_on(async {
                        black_box(service.assign_invoice_number(id).await.unwrap());
                    })
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_idempotent_reassignment(c: &mut Criterion) {
    let rt = runtime();
    let (service, id) = service_with_history(&rt, 100);
    rt.block_on(service.assign_invoice_number(id)).unwrap();

    c.bench_function("reassign_already_numbered", |b| {
        b.iter(|| rt.block_on(async { black_box(service.assign_invoice_number(id).await.unwrap()) }))
    });
}

fn bench_sweep_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_throughput");
    let rt = runtime();

    for pending in [5usize, 50, 200] {
        group.throughput(Throughput::Elements(pending as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pending), &pending, |b, &pending| {
            b.iter_batched(
                || {
                    rt.block_on(async {
                        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
                        for i in 0..pending {
                            let order = OrderId::new(format!("order_{i}")).unwrap();
                            service.ensure_pending(&order).await.unwrap();
                        }
                        RetryPendingInvoices::new(service, &InvoiceConfig::default())
                    })
                },
                |job| rt.block_on(async { black_box(job.run_once().await) }),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_assignment_latency,
    bench_idempotent_reassignment,
    bench_sweep_throughput
);
criterion_main!(benches);
