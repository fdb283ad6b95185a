use crate::error::FulfillmentError;
use crate::fulfillment::{ConfirmPurchaseRequest, FulfillmentService};
use crate::ledger::{SaleRecord, SalesLedger};
use crate::money::format_cents;
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct AppState {
    pub service: FulfillmentService,
    pub ledger: Arc<SalesLedger>,
    pub admin_api_key: Option<String>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "beatvault",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn error_response(e: &FulfillmentError) -> Response {
    let status = match e {
        FulfillmentError::Validation(_) => StatusCode::BAD_REQUEST,
        FulfillmentError::Verification(_) | FulfillmentError::Forbidden(_) => {
            StatusCode::FORBIDDEN
        }
        FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

async fn confirm_purchase(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ConfirmPurchaseRequest>,
) -> Response {
    match state.service.confirm_purchase(req).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn download(
    Extension(state): Extension<Arc<AppState>>,
    Path((credential_id, item_id)): Path<(String, String)>,
) -> Response {
    match state.service.redeem(&credential_id, &item_id).await {
        Ok(grant) => Json(grant).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Shared-secret gate for the reporting surface. No configured secret means
/// the surface is disabled outright, whatever the caller presents.
pub fn admin_authorized(
    configured: Option<&str>,
    bearer: Option<&str>,
    query_key: Option<&str>,
) -> bool {
    match configured {
        Some(secret) if !secret.is_empty() => {
            bearer.map_or(false, |b| b == secret) || query_key.map_or(false, |k| k == secret)
        }
        _ => false,
    }
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn admin_rejected() -> Response {
    error_response(&FulfillmentError::Forbidden(
        "admin credentials required".to_string(),
    ))
}

fn sale_json(record: &SaleRecord) -> serde_json::Value {
    json!({
        "sale_id": record.sale_id,
        "transaction_id": record.transaction_id,
        "item_id": record.item_id,
        "item_title": record.item_title,
        "buyer_contact": record.buyer_contact,
        "amount": record.amount(),
        "is_bundle": record.is_bundle,
        "bundle_discount": format_cents(record.bundle_discount_cents),
        "occurred_at": record.occurred_at_iso(),
    })
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
    key: Option<String>,
}

async fn admin_recent(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RecentQuery>,
) -> Response {
    if !admin_authorized(
        state.admin_api_key.as_deref(),
        bearer_from_headers(&headers).as_deref(),
        query.key.as_deref(),
    ) {
        return admin_rejected();
    }
    let limit = query.limit.unwrap_or(20).min(100);
    let sales = state.ledger.recent(limit).await;
    Json(json!({ "sales": sales.iter().map(sale_json).collect::<Vec<_>>() })).into_response()
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    key: Option<String>,
}

async fn admin_stats(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Response {
    if !admin_authorized(
        state.admin_api_key.as_deref(),
        bearer_from_headers(&headers).as_deref(),
        query.key.as_deref(),
    ) {
        return admin_rejected();
    }
    Json(state.ledger.stats().await).into_response()
}

#[derive(Debug, Deserialize)]
struct ByItemQuery {
    item: String,
    limit: Option<usize>,
    key: Option<String>,
}

async fn admin_by_item(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ByItemQuery>,
) -> Response {
    if !admin_authorized(
        state.admin_api_key.as_deref(),
        bearer_from_headers(&headers).as_deref(),
        query.key.as_deref(),
    ) {
        return admin_rejected();
    }
    let limit = query.limit.unwrap_or(20).min(100);
    let sales = state.ledger.by_item(&query.item, limit).await;
    Json(json!({
        "item_id": query.item,
        "sales": sales.iter().map(sale_json).collect::<Vec<_>>(),
    }))
    .into_response()
}

/// Create the HTTP server with all routes
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Purchase flow
        .route("/api/purchase/confirm", post(confirm_purchase))
        .route("/api/download/:credential_id/:item_id", get(download))
        // Admin reporting surface
        .route("/admin/sales/recent", get(admin_recent))
        .route("/admin/sales/stats", get(admin_stats))
        .route("/admin/sales/by-item", get(admin_by_item))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(port, "starting fulfillment server");
    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
