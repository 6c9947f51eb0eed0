//! dealgrid-api — REST API for DealGrid.
//!
//! Provides axum route handlers for deal creation, geospatial discovery,
//! claiming, and redemption.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/deals` | Create a deal |
//! | GET | `/api/deals?lat&long&radius` | Discover nearby claimable deals |
//! | POST | `/api/deals/{deal_id}/claim` | Claim a voucher |
//! | POST | `/api/claims/{voucher_code}/redeem` | Redeem a voucher |
//! | GET | `/health` | Liveness check |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use dealgrid_cache::{DiscoveryCache, ReservationCache};
use dealgrid_engine::ClaimEngine;
use dealgrid_ledger::Ledger;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Ledger,
    pub reservations: Arc<ReservationCache>,
    pub discovery: Arc<DiscoveryCache>,
    pub engine: Arc<ClaimEngine>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/deals", post(handlers::create_deal).get(handlers::discover_deals))
        .route("/deals/{deal_id}/claim", post(handlers::claim_deal))
        .route("/claims/{voucher_code}/redeem", post(handlers::redeem_claim))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health))
}
