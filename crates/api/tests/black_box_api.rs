use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use billseq_api::app::{self, AppServices};
use billseq_api::app::services::BackgroundTasks;
use billseq_core::InvoiceId;
use billseq_infra::store::{
    InvoiceFilter, InvoiceOrder, InvoiceUpdate, NewInvoice, StoreError, StoreResult,
};
use billseq_infra::{InvoiceConfig, InvoiceStore};
use billseq_invoicing::Invoice;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
    _background: BackgroundTasks,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        let services = Arc::new(services);
        let background = services.start_background();

        // Same router as prod, bound to an ephemeral port.
        let app = app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
            _background: background,
        }
    }

    async fn in_memory() -> Self {
        Self::spawn(AppServices::in_memory(InvoiceConfig::default())).await
    }

    async fn lookup(&self, order_id: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}/store/orders/{}/invoice", self.base_url, order_id))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn place_order(&self, order_id: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/hooks/order-placed", self.base_url))
            .json(&json!({ "id": order_id }))
            .send()
            .await
            .unwrap()
    }

    /// Numbering is asynchronous; poll until the invoice is created.
    async fn created_invoice_eventually(&self, order_id: &str) -> Value {
        for _ in 0..100 {
            let (status, body) = self.lookup(order_id).await;
            if status == StatusCode::OK && body["invoice"]["status"] == "created" {
                return body["invoice"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("invoice for {order_id} was not created within timeout");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn order_id(n: u32) -> String {
    format!("order_{:0>26}", n)
}

#[tokio::test]
async fn health_is_ok() {
    let server = TestServer::in_memory().await;

    let res = server
        .client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_order_ids_are_rejected_before_lookup() {
    let server = TestServer::in_memory().await;

    for bad in ["abc", "order_short", "ORDER_01234567890123456789012345", "order_0123456789012345678901234!"] {
        let (status, body) = server.lookup(bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(body, json!({ "message": "Invalid order ID format", "invoice": null }));
    }
}

#[tokio::test]
async fn unknown_order_has_null_invoice() {
    let server = TestServer::in_memory().await;

    let (status, body) = server.lookup(&order_id(1)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "invoice": null }));
}

#[tokio::test]
async fn placed_order_gets_invoice_number_one() {
    let server = TestServer::in_memory().await;
    let order = order_id(7);

    let res = server.place_order(&order).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Value = res.json().await.unwrap();
    assert_eq!(accepted["order_id"], order.as_str());

    let invoice = server.created_invoice_eventually(&order).await;
    assert_eq!(invoice["invoice_number"], 1);
    assert_eq!(invoice["order_id"], order.as_str());
    assert!(invoice["id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn concurrent_orders_are_numbered_without_gaps() {
    let server = TestServer::in_memory().await;
    let orders: Vec<String> = (0..5).map(order_id).collect();

    for order in &orders {
        assert_eq!(server.place_order(order).await.status(), StatusCode::ACCEPTED);
    }

    let mut numbers = Vec::new();
    for order in &orders {
        let invoice = server.created_invoice_eventually(order).await;
        numbers.push(invoice["invoice_number"].as_u64().unwrap());
    }
    numbers.sort_unstable();

    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn redelivered_order_keeps_its_invoice() {
    let server = TestServer::in_memory().await;
    let order = order_id(3);

    server.place_order(&order).await;
    let first = server.created_invoice_eventually(&order).await;

    server.place_order(&order).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let again = server.created_invoice_eventually(&order).await;

    assert_eq!(first, again);

    // A different order continues the sequence.
    server.place_order(&order_id(4)).await;
    let next = server.created_invoice_eventually(&order_id(4)).await;
    assert_eq!(next["invoice_number"], 2);
}

#[tokio::test]
async fn blank_hook_id_is_rejected() {
    let server = TestServer::in_memory().await;

    let res = server.place_order("   ").await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

/// Store that is unreachable for every call.
struct UnavailableStore;

#[async_trait]
impl InvoiceStore for UnavailableStore {
    async fn list(
        &self,
        _: InvoiceFilter,
        _: Option<InvoiceOrder>,
        _: Option<usize>,
    ) -> StoreResult<Vec<Invoice>> {
        Err(StoreError::Storage("connection refused".to_string()))
    }

    async fn create(&self, _: NewInvoice) -> StoreResult<Invoice> {
        Err(StoreError::Storage("connection refused".to_string()))
    }

    async fn update(&self, _: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>> {
        Err(StoreError::Storage("connection refused".to_string()))
    }

    async fn retrieve(&self, _: InvoiceId) -> StoreResult<Invoice> {
        Err(StoreError::Storage("connection refused".to_string()))
    }

    async fn delete(&self, _: &[InvoiceId]) -> StoreResult<()> {
        Err(StoreError::Storage("connection refused".to_string()))
    }
}

#[tokio::test]
async fn store_failure_is_a_generic_500() {
    let server =
        TestServer::spawn(AppServices::new(InvoiceConfig::default(), Arc::new(UnavailableStore)))
            .await;

    let (status, body) = server.lookup(&order_id(9)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Failed to retrieve invoice", "invoice": null }));
}
