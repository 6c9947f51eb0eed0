//! Ledger — redb-backed durable store for DealGrid.
//!
//! Provides typed operations over deals and claims. All values are
//! JSON-serialized into redb's `&[u8]` value columns; uniqueness
//! constraints (voucher codes, one claim per (deal, user) pair) are index
//! tables maintained in the same write transaction as the records they
//! guard. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::geo::haversine_km;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// What the claim-commit transaction decided before finalizing.
enum CommitStep {
    Commit(Claim),
    Reject(RejectReason),
}

/// What the redemption transaction decided before finalizing.
enum RedeemStep {
    /// Persist the redeemed claim.
    Commit(Claim),
    /// Persist a lazily-expired claim, then reject.
    ExpireAndReject,
    /// Abort without touching anything.
    Reject(RedeemRejection),
}

/// Thread-safe durable ledger backed by redb.
#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!(?path, "ledger opened");
        Ok(ledger)
    }

    /// Create an ephemeral in-memory ledger (for testing).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let ledger = Self { db: Arc::new(db) };
        ledger.ensure_tables()?;
        debug!("in-memory ledger opened");
        Ok(ledger)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEALS).map_err(map_err!(Table))?;
        txn.open_table(CLAIMS).map_err(map_err!(Table))?;
        txn.open_table(CLAIMS_BY_USER).map_err(map_err!(Table))?;
        txn.open_table(VOUCHER_CODES).map_err(map_err!(Table))?;
        txn.open_table(MERCHANT_CLAIMS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deals ──────────────────────────────────────────────────────

    /// Insert a deal record after checking its invariants.
    pub fn create_deal(&self, deal: &Deal) -> LedgerResult<()> {
        if let Err(violation) = deal.check_invariants() {
            return Err(LedgerError::InvariantViolation(violation));
        }
        let value = serde_json::to_vec(deal).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEALS).map_err(map_err!(Table))?;
            table
                .insert(deal.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(deal_id = %deal.id, total = deal.total_vouchers, "deal stored");
        Ok(())
    }

    /// Get a deal by id.
    pub fn get_deal(&self, deal_id: &str) -> LedgerResult<Option<Deal>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEALS).map_err(map_err!(Table))?;
        match table.get(deal_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let deal: Deal =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(deal))
            }
            None => Ok(None),
        }
    }

    /// List all deals.
    pub fn list_deals(&self) -> LedgerResult<Vec<Deal>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEALS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let deal: Deal =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(deal);
        }
        Ok(results)
    }

    /// Claimable deals within `radius_km` of `origin`, paired with their
    /// great-circle distance, nearest first, capped at `limit`.
    pub fn find_nearby(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<(Deal, f64)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEALS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let deal: Deal =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !deal.is_claimable(now) {
                continue;
            }
            let distance = haversine_km(origin, &deal.location);
            if distance <= radius_km {
                results.push((deal, distance));
            }
        }
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(limit);
        Ok(results)
    }

    // ── Claim commit ───────────────────────────────────────────────

    /// Turn a fast-path reservation into a durable claim, or reject it.
    ///
    /// Runs one write transaction that re-verifies every business rule
    /// against the durable record (the cache in front of this store is
    /// not guaranteed consistent with it): the deal must exist, have
    /// inventory, not already be claimed by this user, and not be past
    /// its deadline. Rejections abort the transaction untouched. A
    /// voucher-code collision surfaces as
    /// [`LedgerError::DuplicateVoucherCode`] so the caller can retry
    /// with a fresh code.
    pub fn commit_claim(
        &self,
        deal_id: &str,
        user_id: &str,
        voucher_code: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<CommitOutcome> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let step = {
            let mut deals = txn.open_table(DEALS).map_err(map_err!(Table))?;
            let mut claims = txn.open_table(CLAIMS).map_err(map_err!(Table))?;
            let mut by_user = txn.open_table(CLAIMS_BY_USER).map_err(map_err!(Table))?;
            let mut codes = txn.open_table(VOUCHER_CODES).map_err(map_err!(Table))?;
            let mut by_merchant = txn.open_table(MERCHANT_CLAIMS).map_err(map_err!(Table))?;

            'verify: {
                let mut deal: Deal = {
                    match deals.get(deal_id).map_err(map_err!(Read))? {
                        Some(guard) => serde_json::from_slice(guard.value())
                            .map_err(map_err!(Deserialize))?,
                        None => break 'verify CommitStep::Reject(RejectReason::NotFound),
                    }
                };
                if now >= deal.valid_until {
                    break 'verify CommitStep::Reject(RejectReason::Expired);
                }
                if deal.inventory_remaining == 0 {
                    break 'verify CommitStep::Reject(RejectReason::SoldOut);
                }
                let pair_key = format!("{deal_id}:{user_id}");
                let pair_taken = by_user
                    .get(pair_key.as_str())
                    .map_err(map_err!(Read))?
                    .is_some();
                if pair_taken || deal.has_claimed(user_id) {
                    break 'verify CommitStep::Reject(RejectReason::AlreadyClaimed);
                }
                let code_taken = codes
                    .get(voucher_code)
                    .map_err(map_err!(Read))?
                    .is_some();
                if code_taken {
                    return Err(LedgerError::DuplicateVoucherCode(voucher_code.to_string()));
                }

                deal.inventory_remaining -= 1;
                deal.claimed_by.push(user_id.to_string());
                deal.updated_at = now;
                if let Err(violation) = deal.check_invariants() {
                    error!(deal_id, %violation, "refusing claim commit");
                    return Err(LedgerError::InvariantViolation(violation));
                }

                let claim = Claim {
                    id: Uuid::new_v4().simple().to_string(),
                    deal_id: deal_id.to_string(),
                    user_id: user_id.to_string(),
                    merchant_id: deal.merchant_id.clone(),
                    voucher_code: voucher_code.to_string(),
                    status: ClaimStatus::Active,
                    claimed_at: now,
                    redeemed_at: None,
                    expires_at: deal.valid_until,
                };

                let deal_value = serde_json::to_vec(&deal).map_err(map_err!(Serialize))?;
                let claim_value = serde_json::to_vec(&claim).map_err(map_err!(Serialize))?;
                deals
                    .insert(deal_id, deal_value.as_slice())
                    .map_err(map_err!(Write))?;
                claims
                    .insert(claim.id.as_str(), claim_value.as_slice())
                    .map_err(map_err!(Write))?;
                by_user
                    .insert(pair_key.as_str(), claim.id.as_str())
                    .map_err(map_err!(Write))?;
                codes
                    .insert(voucher_code, claim.id.as_str())
                    .map_err(map_err!(Write))?;
                by_merchant
                    .insert(claim.merchant_index_key().as_str(), claim.id.as_str())
                    .map_err(map_err!(Write))?;

                CommitStep::Commit(claim)
            }
        };
        match step {
            CommitStep::Commit(claim) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(deal_id, user_id, voucher = %claim.voucher_code, "claim committed");
                Ok(CommitOutcome::Committed(claim))
            }
            CommitStep::Reject(reason) => {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(deal_id, user_id, %reason, "claim rejected");
                Ok(CommitOutcome::Rejected(reason))
            }
        }
    }

    // ── Claims ─────────────────────────────────────────────────────

    /// Look up a claim by voucher code.
    pub fn get_claim_by_voucher(&self, voucher_code: &str) -> LedgerResult<Option<Claim>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let codes = txn.open_table(VOUCHER_CODES).map_err(map_err!(Table))?;
        let claim_id = match codes.get(voucher_code).map_err(map_err!(Read))? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        let claims = txn.open_table(CLAIMS).map_err(map_err!(Table))?;
        match claims.get(claim_id.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let claim: Claim =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(claim))
            }
            None => Ok(None),
        }
    }

    /// Redeem a claim by voucher code.
    ///
    /// Applies lazy expiry: an overdue `active` claim is persisted as
    /// `expired` and the redemption rejected, regardless of stored status.
    /// Double redemption is rejected.
    pub fn redeem_claim(
        &self,
        voucher_code: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<RedeemOutcome> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let step = {
            let codes = txn.open_table(VOUCHER_CODES).map_err(map_err!(Table))?;
            let mut claims = txn.open_table(CLAIMS).map_err(map_err!(Table))?;

            'decide: {
                let claim_id = match codes.get(voucher_code).map_err(map_err!(Read))? {
                    Some(guard) => guard.value().to_string(),
                    None => break 'decide RedeemStep::Reject(RedeemRejection::NotFound),
                };
                let mut claim: Claim = match claims
                    .get(claim_id.as_str())
                    .map_err(map_err!(Read))?
                {
                    Some(guard) => serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?,
                    None => {
                        return Err(LedgerError::Read(format!(
                            "voucher {voucher_code} indexes missing claim {claim_id}"
                        )));
                    }
                };

                match claim.effective_status(now) {
                    ClaimStatus::Redeemed => {
                        RedeemStep::Reject(RedeemRejection::AlreadyRedeemed)
                    }
                    ClaimStatus::Expired => {
                        if claim.status == ClaimStatus::Active {
                            claim.status = ClaimStatus::Expired;
                            let value =
                                serde_json::to_vec(&claim).map_err(map_err!(Serialize))?;
                            claims
                                .insert(claim_id.as_str(), value.as_slice())
                                .map_err(map_err!(Write))?;
                            RedeemStep::ExpireAndReject
                        } else {
                            RedeemStep::Reject(RedeemRejection::Expired)
                        }
                    }
                    ClaimStatus::Active => {
                        claim.status = ClaimStatus::Redeemed;
                        claim.redeemed_at = Some(now);
                        let value = serde_json::to_vec(&claim).map_err(map_err!(Serialize))?;
                        claims
                            .insert(claim_id.as_str(), value.as_slice())
                            .map_err(map_err!(Write))?;
                        RedeemStep::Commit(claim)
                    }
                }
            }
        };
        match step {
            RedeemStep::Commit(claim) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(voucher_code, "claim redeemed");
                Ok(RedeemOutcome::Redeemed(claim))
            }
            RedeemStep::ExpireAndReject => {
                // Persist the lazy active → expired transition.
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(voucher_code, "redemption rejected: expired");
                Ok(RedeemOutcome::Rejected(RedeemRejection::Expired))
            }
            RedeemStep::Reject(rejection) => {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(voucher_code, %rejection, "redemption rejected");
                Ok(RedeemOutcome::Rejected(rejection))
            }
        }
    }

    /// List all claims for a merchant (by index prefix scan).
    pub fn list_claims_for_merchant(&self, merchant_id: &str) -> LedgerResult<Vec<Claim>> {
        let prefix = format!("{merchant_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(MERCHANT_CLAIMS).map_err(map_err!(Table))?;
        let claims = txn.open_table(CLAIMS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in index.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            if let Some(guard) = claims.get(value.value()).map_err(map_err!(Read))? {
                let claim: Claim =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                results.push(claim);
            }
        }
        Ok(results)
    }
}
