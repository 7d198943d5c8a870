use axum::{
    Router,
    routing::{get, post},
};

pub mod hooks;
pub mod invoices;
pub mod system;

/// Router for the store query surface and inbound hooks.
pub fn router() -> Router {
    Router::new()
        .route("/store/orders/:id/invoice", get(invoices::get_order_invoice))
        .route("/hooks/order-placed", post(hooks::order_placed))
}
