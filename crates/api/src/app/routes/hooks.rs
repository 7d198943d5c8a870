use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
};
use tracing::{error, info};

use billseq_core::OrderId;
use billseq_events::{EventBus, OrderPlaced};

use crate::app::dto::{HookAccepted, OrderPlacedHook};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// `POST /hooks/order-placed`
///
/// Publishes the notification and returns `202`; numbering happens in the
/// background worker.
pub async fn order_placed(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<OrderPlacedHook>,
) -> Result<(StatusCode, Json<HookAccepted>), ApiError> {
    let order_id =
        OrderId::new(body.id).map_err(|err| ApiError::InvalidHookBody(err.to_string()))?;

    let event = OrderPlaced::new(order_id);
    let accepted = HookAccepted::from(&event);

    services.bus.publish(event).map_err(|err| {
        error!(error = ?err, "failed to publish order placed event");
        ApiError::Publish
    })?;

    info!(order_id = %accepted.order_id, event_id = %accepted.event_id, "order placed event accepted");
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
