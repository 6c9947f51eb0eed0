//! REST API handlers.
//!
//! Each handler is thin glue: validate the request, call the engine,
//! discovery cache, or ledger, and map outcomes to status codes. Every
//! claim rejection carries its specific reason — client UX differs for
//! "you already have this", "it's gone", and "it's over".

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use dealgrid_engine::{ClaimError, RedeemError};
use dealgrid_ledger::{Deal, GeoPoint, RejectReason};

use crate::ApiState;

/// Default discovery radius in km.
const DEFAULT_RADIUS_KM: u32 = 5;
/// Allowed discovery radius range in km.
const RADIUS_RANGE_KM: std::ops::RangeInclusive<u32> = 1..=50;

fn fail_response(status: StatusCode, reason: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({
            "status": "fail",
            "reason": reason,
        })),
    )
}

fn error_response(message: &str) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "status": "error",
            "message": message,
        })),
    )
}

// ── Deal creation ──────────────────────────────────────────────

/// Request body for `POST /api/deals`.
#[derive(Deserialize)]
pub struct CreateDealRequest {
    pub merchant_id: String,
    pub title: String,
    pub total_vouchers: u32,
    pub valid_until: DateTime<Utc>,
    pub location: LocationBody,
}

/// Lat/lng pair as the wire format carries it.
#[derive(Deserialize)]
pub struct LocationBody {
    pub lat: f64,
    pub lng: f64,
}

impl CreateDealRequest {
    /// Validate field bounds; returns the first violation.
    fn validate(&self, now: DateTime<Utc>) -> Result<(), &'static str> {
        if self.merchant_id.trim().is_empty() || self.merchant_id.len() > 100 {
            return Err("merchant_id must be 1-100 characters");
        }
        if self.title.trim().len() < 5 || self.title.len() > 200 {
            return Err("title must be 5-200 characters");
        }
        if self.total_vouchers == 0 || self.total_vouchers > 10_000 {
            return Err("total_vouchers must be between 1 and 10000");
        }
        if self.valid_until <= now {
            return Err("valid_until must be in the future");
        }
        if !(-90.0..=90.0).contains(&self.location.lat) {
            return Err("latitude must be between -90 and 90");
        }
        if !(-180.0..=180.0).contains(&self.location.lng) {
            return Err("longitude must be between -180 and 180");
        }
        Ok(())
    }
}

/// POST /api/deals
pub async fn create_deal(
    State(state): State<ApiState>,
    Json(req): Json<CreateDealRequest>,
) -> impl IntoResponse {
    let now = Utc::now();
    if let Err(reason) = req.validate(now) {
        return fail_response(StatusCode::BAD_REQUEST, reason).into_response();
    }

    let deal = Deal::new(
        req.merchant_id,
        req.title,
        req.total_vouchers,
        req.valid_until,
        GeoPoint {
            lat: req.location.lat,
            lng: req.location.lng,
        },
        now,
    );
    if let Err(e) = state.ledger.create_deal(&deal) {
        error!(error = %e, "deal creation failed");
        return error_response("failed to create deal").into_response();
    }
    // Project the fresh deal into the fast path so the first claim skips
    // hydration.
    state.reservations.prime(&deal).await;

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "success",
            "deal_id": deal.id,
            "data": {
                "merchant_id": deal.merchant_id,
                "title": deal.title,
                "total_vouchers": deal.total_vouchers,
                "valid_until": deal.valid_until,
                "location": deal.location,
            },
        })),
    )
        .into_response()
}

// ── Discovery ──────────────────────────────────────────────────

/// Query parameters for `GET /api/deals`.
#[derive(Deserialize)]
pub struct DiscoveryParams {
    pub lat: f64,
    pub long: f64,
    pub radius: Option<u32>,
}

/// GET /api/deals?lat&long&radius
pub async fn discover_deals(
    State(state): State<ApiState>,
    Query(params): Query<DiscoveryParams>,
) -> impl IntoResponse {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.long) {
        return fail_response(StatusCode::BAD_REQUEST, "coordinates out of range")
            .into_response();
    }
    let radius = params
        .radius
        .unwrap_or(DEFAULT_RADIUS_KM)
        .clamp(*RADIUS_RANGE_KM.start(), *RADIUS_RANGE_KM.end());

    match state
        .discovery
        .discover(params.lat, params.long, radius, Utc::now())
        .await
    {
        Ok((source, deals)) => Json(serde_json::json!({
            "status": "success",
            "source": source,
            "count": deals.len(),
            "deals": deals,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "discovery failed");
            error_response("failed to discover deals").into_response()
        }
    }
}

// ── Claiming ───────────────────────────────────────────────────

/// Request body for `POST /api/deals/{deal_id}/claim`.
#[derive(Deserialize)]
pub struct ClaimRequest {
    pub user_id: String,
}

fn rejection_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::SoldOut => StatusCode::CONFLICT,
        RejectReason::AlreadyClaimed | RejectReason::Expired => StatusCode::BAD_REQUEST,
        RejectReason::NotFound => StatusCode::NOT_FOUND,
    }
}

/// POST /api/deals/{deal_id}/claim
pub async fn claim_deal(
    State(state): State<ApiState>,
    Path(deal_id): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> impl IntoResponse {
    if req.user_id.trim().is_empty() {
        return fail_response(StatusCode::BAD_REQUEST, "user_id is required").into_response();
    }

    match state.engine.claim(&deal_id, &req.user_id).await {
        Ok(claim) => Json(serde_json::json!({
            "status": "success",
            "voucher_code": claim.voucher_code,
        }))
        .into_response(),
        Err(ClaimError::Rejected(reason)) => {
            fail_response(rejection_status(reason), reason.as_str()).into_response()
        }
        Err(ClaimError::System(msg)) => {
            error!(deal_id = %deal_id, error = %msg, "claim failed");
            error_response("failed to claim deal").into_response()
        }
    }
}

// ── Redemption ─────────────────────────────────────────────────

/// POST /api/claims/{voucher_code}/redeem
pub async fn redeem_claim(
    State(state): State<ApiState>,
    Path(voucher_code): Path<String>,
) -> impl IntoResponse {
    use dealgrid_ledger::RedeemRejection;

    match state.engine.redeem(&voucher_code).await {
        Ok(claim) => Json(serde_json::json!({
            "status": "success",
            "data": claim,
        }))
        .into_response(),
        Err(RedeemError::Rejected(RedeemRejection::NotFound)) => {
            fail_response(StatusCode::NOT_FOUND, RedeemRejection::NotFound.as_str())
                .into_response()
        }
        Err(RedeemError::Rejected(rejection)) => {
            fail_response(StatusCode::BAD_REQUEST, rejection.as_str()).into_response()
        }
        Err(RedeemError::System(msg)) => {
            error!(voucher_code = %voucher_code, error = %msg, "redemption failed");
            error_response("failed to redeem claim").into_response()
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}
