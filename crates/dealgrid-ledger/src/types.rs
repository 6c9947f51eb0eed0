//! Domain types for the DealGrid ledger.
//!
//! Deals and claims are serialized to/from JSON for storage in redb tables.
//! Timestamps are `chrono::DateTime<Utc>` and travel as ISO-8601 on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a deal.
pub type DealId = String;

/// Unique identifier for a claim.
pub type ClaimId = String;

/// Opaque user identifier supplied by the caller.
pub type UserId = String;

/// Opaque merchant identifier supplied at deal creation.
pub type MerchantId = String;

// ── Geography ─────────────────────────────────────────────────────

/// A WGS-84 point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Whether the point lies in the valid latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

// ── Deal ──────────────────────────────────────────────────────────

/// A merchant-issued flash deal with bounded voucher inventory.
///
/// Deals are never deleted; expiry is a read-time computed state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    pub id: DealId,
    pub merchant_id: MerchantId,
    pub title: String,
    /// Immutable after creation.
    pub total_vouchers: u32,
    /// 0 ≤ remaining ≤ total_vouchers at all times.
    pub inventory_remaining: u32,
    pub valid_until: DateTime<Utc>,
    pub location: GeoPoint,
    /// Users holding a claim. No duplicates; len = total − remaining.
    pub claimed_by: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// Build a fresh deal with full inventory.
    pub fn new(
        merchant_id: impl Into<MerchantId>,
        title: impl Into<String>,
        total_vouchers: u32,
        valid_until: DateTime<Utc>,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            merchant_id: merchant_id.into(),
            title: title.into(),
            total_vouchers,
            inventory_remaining: total_vouchers,
            valid_until,
            location,
            claimed_by: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A deal is claimable iff it has not expired and inventory remains.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until && self.inventory_remaining > 0
    }

    /// Whether the user already holds a claim on this deal.
    pub fn has_claimed(&self, user_id: &str) -> bool {
        self.claimed_by.iter().any(|u| u == user_id)
    }

    /// Check the inventory/claim-set invariants, returning a description
    /// of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.total_vouchers == 0 {
            return Err(format!("deal {}: total_vouchers must be positive", self.id));
        }
        if self.inventory_remaining > self.total_vouchers {
            return Err(format!(
                "deal {}: inventory_remaining {} exceeds total_vouchers {}",
                self.id, self.inventory_remaining, self.total_vouchers
            ));
        }
        let claimed = self.claimed_by.len() as u32;
        if claimed != self.total_vouchers - self.inventory_remaining {
            return Err(format!(
                "deal {}: claimed_by size {} inconsistent with {}/{} inventory",
                self.id, claimed, self.inventory_remaining, self.total_vouchers
            ));
        }
        if !self.location.is_valid() {
            return Err(format!(
                "deal {}: coordinates ({}, {}) out of range",
                self.id, self.location.lat, self.location.lng
            ));
        }
        Ok(())
    }
}

// ── Claim ─────────────────────────────────────────────────────────

/// Stored lifecycle status of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Redeemed,
    Expired,
}

/// A single user's granted voucher for a deal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: ClaimId,
    pub deal_id: DealId,
    pub user_id: UserId,
    /// Denormalized from the deal for merchant-side queries.
    pub merchant_id: MerchantId,
    /// Globally unique; uniqueness enforced by the voucher-code index.
    pub voucher_code: String,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Copied from the deal's `valid_until` at claim time. Immutable.
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    /// Lazy-expiry predicate: an overdue `active` claim reads as `expired`
    /// without a background sweep.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ClaimStatus {
        match self.status {
            ClaimStatus::Active if now >= self.expires_at => ClaimStatus::Expired,
            status => status,
        }
    }

    /// Build the key for the per-(deal, user) uniqueness index.
    pub fn user_index_key(&self) -> String {
        format!("{}:{}", self.deal_id, self.user_id)
    }

    /// Build the key for the merchant listing index.
    pub fn merchant_index_key(&self) -> String {
        format!("{}:{}", self.merchant_id, self.id)
    }
}

// ── Claim-commit outcomes ─────────────────────────────────────────

/// Why a durable commit (or a fast-path reservation) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    SoldOut,
    AlreadyClaimed,
    Expired,
    NotFound,
}

impl RejectReason {
    /// Wire-format reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SoldOut => "sold_out",
            RejectReason::AlreadyClaimed => "already_claimed",
            RejectReason::Expired => "expired",
            RejectReason::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a durable claim commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The transaction committed; the claim is durable.
    Committed(Claim),
    /// Re-verification failed; the transaction was aborted.
    Rejected(RejectReason),
}

// ── Redemption outcomes ───────────────────────────────────────────

/// Why a redemption was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemRejection {
    AlreadyRedeemed,
    Expired,
    NotFound,
}

impl RedeemRejection {
    /// Wire-format reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RedeemRejection::AlreadyRedeemed => "already_redeemed",
            RedeemRejection::Expired => "expired",
            RedeemRejection::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for RedeemRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a redemption attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    /// The claim transitioned active → redeemed.
    Redeemed(Claim),
    /// The transition was refused.
    Rejected(RedeemRejection),
}
