//! Simple REST API server example for the cheki engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /checkout` - Create a pending order and get a payment token
//! - `POST /settlements` - Gateway settlement callback (idempotent)
//! - `GET /orders` - List all orders
//! - `GET /orders/:id` - Get an order by ID
//! - `GET /stock` - List stock levels
//! - `PUT /admin/stock` - Set a product counter (operator)
//! - `POST /admin/stock/adjust` - Move a product counter by a delta (operator)
//! - `DELETE /admin/orders/:id` - Delete an order, restoring stock if owed
//! - `POST /admin/orders/:id/use` - Mark a ticket used
//! - `POST /admin/orders/:id/undo` - Undo a ticket use (within the window)
//! - `POST /admin/sweep` - Void abandoned pending orders
//!
//! ## Example Usage
//!
//! ```bash
//! # Seed stock
//! curl -X PUT http://localhost:3000/admin/stock \
//!   -H "Content-Type: application/json" \
//!   -d '{"product": "group-cheki", "value": 50, "operator": "staff"}'
//!
//! # Checkout
//! curl -X POST http://localhost:3000/checkout \
//!   -H "Content-Type: application/json" \
//!   -d '{"order_id": "7d1f82da-aaaa-bbbb-cccc-000000000001", "customer_id": 7,
//!        "line_items": [{"product": "group-cheki", "quantity": 2, "unit_price": "1500"}]}'
//!
//! # Settlement callback (safe to replay)
//! curl -X POST http://localhost:3000/settlements \
//!   -H "Content-Type: application/json" \
//!   -d '{"order_id": "7d1f82da-aaaa-bbbb-cccc-000000000001", "reported_status": "SETTLED"}'
//!
//! # Inspect
//! curl http://localhost:3000/orders
//! curl http://localhost:3000/stock
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use cheki_engine::{
    CheckoutRequest, CustomerId, Engine, LineItem, OperatorId, OrderId, ProductKey,
    ReportedStatus, SettlementEvent, SettlementOutcome, TicketError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// === Request/Response DTOs ===

/// Request body for a checkout.
///
/// ```json
/// {"order_id": "...", "customer_id": 7,
///  "line_items": [{"product": "group-cheki", "quantity": 2, "unit_price": "1500"}]}
/// ```
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub order_id: Uuid,
    pub customer_id: u64,
    pub line_items: Vec<LineItemBody>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemBody {
    pub product: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub payment_token: String,
}

/// Request body for the gateway settlement callback.
#[derive(Debug, Deserialize)]
pub struct SettlementBody {
    pub order_id: Uuid,
    pub reported_status: ReportedStatus,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub order_id: Uuid,
    pub outcome: String,
}

/// Response body for order information.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub customer_id: u64,
    pub status: String,
    pub quantity: u32,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockBody {
    pub product: String,
    pub value: u32,
    pub operator: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockBody {
    pub product: String,
    pub delta: i64,
    pub operator: String,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub product: String,
    pub available: u32,
}

#[derive(Debug, Deserialize)]
pub struct OperatorBody {
    pub operator: String,
}

#[derive(Debug, Deserialize)]
pub struct OperatorQuery {
    pub operator: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub swept: Vec<Uuid>,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `TicketError` into HTTP responses.
pub struct AppError(TicketError);

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            TicketError::InsufficientStock { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            TicketError::UnknownProduct(_) => (StatusCode::NOT_FOUND, "UNKNOWN_PRODUCT"),
            TicketError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            TicketError::DuplicateOrder(_) => (StatusCode::CONFLICT, "DUPLICATE_ORDER"),
            TicketError::InvalidTransition { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TRANSITION")
            }
            TicketError::UndoWindowExpired(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNDO_WINDOW_EXPIRED")
            }
            TicketError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
            TicketError::GatewayUnavailable(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE"),
            TicketError::StorageContention(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_CONTENTION")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn outcome_label(outcome: SettlementOutcome) -> &'static str {
    match outcome {
        SettlementOutcome::Confirmed => "CONFIRMED",
        SettlementOutcome::AlreadyConfirmed => "ALREADY_CONFIRMED",
        SettlementOutcome::Voided => "VOIDED",
        SettlementOutcome::AlreadyVoid => "ALREADY_VOID",
        SettlementOutcome::FailureIgnored => "FAILURE_IGNORED",
        SettlementOutcome::OutOfStock => "OUT_OF_STOCK_VOIDED",
        SettlementOutcome::StillPending => "STILL_PENDING",
    }
}

fn order_response(order: &cheki_engine::Order) -> OrderResponse {
    OrderResponse {
        order_id: order.order_id().0,
        customer_id: order.customer_id().0,
        status: order.status().to_string(),
        quantity: order.total_quantity(),
        total_amount: order.total_amount(),
        created_at: order.created_at(),
        used_at: order.used_at(),
    }
}

// === Handlers ===

/// POST /checkout - Create a pending order and request a payment token.
async fn create_checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let order_id = OrderId(body.order_id);
    let request = CheckoutRequest {
        order_id,
        customer_id: CustomerId(body.customer_id),
        line_items: body
            .line_items
            .into_iter()
            .map(|item| LineItem::new(item.product, item.quantity, item.unit_price))
            .collect(),
    };

    let token = state.engine.checkout(request)?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order_id.0,
            payment_token: token.0,
        }),
    ))
}

/// POST /settlements - Apply a gateway notification; replays get 200 again.
async fn apply_settlement(
    State(state): State<AppState>,
    Json(body): Json<SettlementBody>,
) -> Result<Json<SettlementResponse>, AppError> {
    let outcome = state.engine.settle(SettlementEvent {
        order_id: OrderId(body.order_id),
        reported_status: body.reported_status,
    })?;

    Ok(Json(SettlementResponse {
        order_id: body.order_id,
        outcome: outcome_label(outcome).to_string(),
    }))
}

/// GET /orders/:id - Get order by ID.
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.engine.order(&OrderId(id))?;
    Ok(Json(order_response(&order)))
}

/// GET /orders - List all orders, oldest first.
async fn list_orders(State(state): State<AppState>) -> Json<Vec<OrderResponse>> {
    let orders = state
        .engine
        .orders()
        .iter()
        .map(order_response)
        .collect::<Vec<_>>();
    Json(orders)
}

/// GET /stock - List all product counters.
async fn list_stock(State(state): State<AppState>) -> Json<Vec<StockResponse>> {
    let stock = state
        .engine
        .stock_levels()
        .into_iter()
        .map(|(product, available)| StockResponse {
            product: product.0,
            available,
        })
        .collect::<Vec<_>>();
    Json(stock)
}

/// PUT /admin/stock - Overwrite a product counter.
async fn set_stock(
    State(state): State<AppState>,
    Json(body): Json<SetStockBody>,
) -> Json<StockResponse> {
    let product = ProductKey(body.product);
    state
        .engine
        .set_stock(OperatorId(body.operator), &product, body.value);
    Json(StockResponse {
        product: product.0,
        available: body.value,
    })
}

/// POST /admin/stock/adjust - Move a product counter by a signed delta.
async fn adjust_stock(
    State(state): State<AppState>,
    Json(body): Json<AdjustStockBody>,
) -> Result<Json<StockResponse>, AppError> {
    let product = ProductKey(body.product);
    let (_previous, resulting) =
        state
            .engine
            .adjust_stock(OperatorId(body.operator), &product, body.delta)?;
    Ok(Json(StockResponse {
        product: product.0,
        available: resulting,
    }))
}

/// DELETE /admin/orders/:id - Delete an order, restoring stock if owed.
async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OperatorQuery>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .delete_order(OperatorId(query.operator), OrderId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/orders/:id/use - Mark a ticket consumed.
async fn use_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OperatorBody>,
) -> Result<StatusCode, AppError> {
    state.engine.use_ticket(OperatorId(body.operator), OrderId(id))?;
    Ok(StatusCode::OK)
}

/// POST /admin/orders/:id/undo - Undo a ticket use within the window.
async fn undo_ticket_use(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OperatorBody>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .undo_ticket_use(OperatorId(body.operator), OrderId(id))?;
    Ok(StatusCode::OK)
}

/// POST /admin/sweep - Void abandoned pending orders.
async fn sweep_pending(State(state): State<AppState>) -> Json<SweepResponse> {
    let swept = state
        .engine
        .sweep_pending()
        .into_iter()
        .map(|order_id| order_id.0)
        .collect();
    Json(SweepResponse { swept })
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/settlements", post(apply_settlement))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/stock", get(list_stock))
        .route("/admin/stock", put(set_stock))
        .route("/admin/stock/adjust", post(adjust_stock))
        .route("/admin/orders/{id}", delete(delete_order))
        .route("/admin/orders/{id}/use", post(use_ticket))
        .route("/admin/orders/{id}/undo", post(undo_ticket_use))
        .route("/admin/sweep", post(sweep_pending))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Cheki engine API running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST   /checkout              - Create a pending order");
    println!("  POST   /settlements           - Gateway settlement callback");
    println!("  GET    /orders                - List all orders");
    println!("  GET    /orders/:id            - Get order by ID");
    println!("  GET    /stock                 - List stock levels");
    println!("  PUT    /admin/stock           - Set a product counter");
    println!("  POST   /admin/stock/adjust    - Adjust a product counter");
    println!("  DELETE /admin/orders/:id      - Delete an order");
    println!("  POST   /admin/orders/:id/use  - Mark ticket used");
    println!("  POST   /admin/orders/:id/undo - Undo ticket use");
    println!("  POST   /admin/sweep           - Void abandoned pending orders");

    axum::serve(listener, app).await.unwrap();
}
