//! Fast-path reservation store.
//!
//! One slot per deal: a remaining-inventory counter plus the set of users
//! holding a reservation, guarded by a per-deal mutex so a reservation
//! attempt runs as a single indivisible unit. The dedup check runs before
//! the decrement — the reverse order would let an already-reserved user
//! spuriously consume inventory. Slots hydrate lazily from the ledger the
//! first time a deal is seen; the slot mutex doubles as the per-deal
//! initialization lock, so hydration happens once even under contention.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use dealgrid_ledger::{Deal, DealId, Ledger, LedgerResult, UserId};

/// Outcome of a fast-path reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// One unit of inventory is now held for this user.
    Reserved,
    /// The user already holds a reservation (or a hydrated claim).
    AlreadyReserved,
    /// The counter is exhausted.
    SoldOut,
    /// The deal's validity window has passed.
    Expired,
    /// The deal exists in neither the cache nor the ledger.
    NotFound,
}

/// Per-deal reservation state, mirroring ledger truth at hydration time.
struct Slot {
    remaining: i64,
    valid_until: DateTime<Utc>,
    reserved: HashSet<UserId>,
}

impl Slot {
    fn from_deal(deal: &Deal) -> Self {
        Self {
            remaining: i64::from(deal.inventory_remaining),
            valid_until: deal.valid_until,
            reserved: deal.claimed_by.iter().cloned().collect(),
        }
    }
}

/// Fast-path reservation store with lazy per-deal hydration.
pub struct ReservationCache {
    ledger: Ledger,
    /// `None` inside the mutex means the slot has not been hydrated yet.
    slots: RwLock<HashMap<DealId, Arc<Mutex<Option<Slot>>>>>,
}

impl ReservationCache {
    /// Create a reservation cache hydrating from the given ledger.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Get the slot cell for a deal, creating an unhydrated one if absent.
    async fn slot_cell(&self, deal_id: &str) -> Arc<Mutex<Option<Slot>>> {
        if let Some(cell) = self.slots.read().await.get(deal_id) {
            return cell.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(deal_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Attempt to reserve one voucher of `deal_id` for `user_id`.
    ///
    /// The whole sequence — hydration if needed, expiry check, dedup
    /// check, decrement with undo-on-negative, set insert — runs under
    /// the deal's slot mutex and is atomic with respect to every other
    /// reservation attempt on the same deal.
    pub async fn try_reserve(
        &self,
        deal_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<ReserveOutcome> {
        let cell = self.slot_cell(deal_id).await;
        let mut guard = cell.lock().await;

        if guard.is_none() {
            match self.ledger.get_deal(deal_id)? {
                Some(deal) => {
                    debug!(deal_id, remaining = deal.inventory_remaining, "slot hydrated");
                    *guard = Some(Slot::from_deal(&deal));
                }
                None => return Ok(ReserveOutcome::NotFound),
            }
        }
        let Some(slot) = guard.as_mut() else {
            return Ok(ReserveOutcome::NotFound);
        };

        if now >= slot.valid_until {
            return Ok(ReserveOutcome::Expired);
        }
        if slot.reserved.contains(user_id) {
            return Ok(ReserveOutcome::AlreadyReserved);
        }
        slot.remaining -= 1;
        if slot.remaining < 0 {
            slot.remaining += 1;
            return Ok(ReserveOutcome::SoldOut);
        }
        slot.reserved.insert(user_id.to_string());
        debug!(deal_id, user_id, remaining = slot.remaining, "reserved");
        Ok(ReserveOutcome::Reserved)
    }

    /// Undo a reservation, restoring the slot to its pre-reservation state.
    ///
    /// Exact and idempotent: the counter is incremented only when the user
    /// actually held a reservation. A missing or unhydrated slot is a
    /// no-op — nothing was reserved in cache, and the next attempt
    /// rehydrates from ledger truth.
    pub async fn release(&self, deal_id: &str, user_id: &str) {
        let cell = {
            let slots = self.slots.read().await;
            match slots.get(deal_id) {
                Some(cell) => cell.clone(),
                None => return,
            }
        };
        let mut guard = cell.lock().await;
        if let Some(slot) = guard.as_mut() {
            if slot.reserved.remove(user_id) {
                slot.remaining += 1;
                debug!(deal_id, user_id, remaining = slot.remaining, "reservation released");
            }
        }
    }

    /// Project a freshly created deal into the cache.
    pub async fn prime(&self, deal: &Deal) {
        let cell = self.slot_cell(&deal.id).await;
        let mut guard = cell.lock().await;
        *guard = Some(Slot::from_deal(deal));
        debug!(deal_id = %deal.id, remaining = deal.inventory_remaining, "slot primed");
    }

    /// Drop a deal's slot, forcing rehydration on next use (for tests and
    /// eviction simulations).
    pub async fn evict(&self, deal_id: &str) {
        self.slots.write().await.remove(deal_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use dealgrid_ledger::GeoPoint;

    fn point() -> GeoPoint {
        GeoPoint {
            lat: 19.0760,
            lng: 72.8777,
        }
    }

    fn live_deal(total: u32) -> Deal {
        let now = Utc::now();
        Deal::new("m-1", "Cache test deal", total, now + TimeDelta::hours(2), point(), now)
    }

    async fn primed_cache(deal: &Deal) -> ReservationCache {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.create_deal(deal).unwrap();
        let cache = ReservationCache::new(ledger);
        cache.prime(deal).await;
        cache
    }

    #[tokio::test]
    async fn reserve_then_duplicate_then_sold_out() {
        let deal = live_deal(2);
        let cache = primed_cache(&deal).await;
        let now = Utc::now();

        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::AlreadyReserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-3", now).await.unwrap(),
            ReserveOutcome::SoldOut
        );
    }

    #[tokio::test]
    async fn duplicate_check_does_not_consume_inventory() {
        let deal = live_deal(1);
        let cache = primed_cache(&deal).await;
        let now = Utc::now();

        cache.try_reserve(&deal.id, "u-1", now).await.unwrap();
        // Repeated attempts by the holder must not burn the last unit...
        for _ in 0..5 {
            assert_eq!(
                cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
                ReserveOutcome::AlreadyReserved
            );
        }
        // ...which is provable because releasing frees exactly one unit.
        cache.release(&deal.id, "u-1").await;
        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
    }

    #[tokio::test]
    async fn hydrates_lazily_from_ledger() {
        let deal = live_deal(3);
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.create_deal(&deal).unwrap();
        ledger
            .commit_claim(&deal.id, "u-prior", "DG-HYDRATE-1", Utc::now())
            .unwrap();

        // No prime: first touch loads remaining=2 and the claimed set.
        let cache = ReservationCache::new(ledger);
        let now = Utc::now();
        assert_eq!(
            cache.try_reserve(&deal.id, "u-prior", now).await.unwrap(),
            ReserveOutcome::AlreadyReserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-3", now).await.unwrap(),
            ReserveOutcome::SoldOut
        );
    }

    #[tokio::test]
    async fn unknown_deal_is_not_found() {
        let ledger = Ledger::open_in_memory().unwrap();
        let cache = ReservationCache::new(ledger);
        assert_eq!(
            cache.try_reserve("ghost", "u-1", Utc::now()).await.unwrap(),
            ReserveOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn expired_deal_is_rejected_before_any_mutation() {
        let now = Utc::now();
        let mut deal = live_deal(5);
        deal.valid_until = now - TimeDelta::minutes(1);
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.create_deal(&deal).unwrap();
        let cache = ReservationCache::new(ledger);

        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::Expired
        );
        // Inventory untouched even with plenty remaining.
        cache.release(&deal.id, "u-1").await;
        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::Expired
        );
    }

    #[tokio::test]
    async fn release_restores_exactly_and_is_idempotent() {
        let deal = live_deal(1);
        let cache = primed_cache(&deal).await;
        let now = Utc::now();

        cache.try_reserve(&deal.id, "u-1", now).await.unwrap();
        cache.release(&deal.id, "u-1").await;
        // Double release must not mint inventory.
        cache.release(&deal.id, "u-1").await;

        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-3", now).await.unwrap(),
            ReserveOutcome::SoldOut
        );
    }

    #[tokio::test]
    async fn release_on_unhydrated_slot_is_a_noop() {
        let deal = live_deal(1);
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.create_deal(&deal).unwrap();
        let cache = ReservationCache::new(ledger);

        cache.release(&deal.id, "u-1").await;
        let now = Utc::now();
        assert_eq!(
            cache.try_reserve(&deal.id, "u-1", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::SoldOut
        );
    }

    #[tokio::test]
    async fn eviction_rehydrates_from_ledger_truth() {
        let deal = live_deal(2);
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.create_deal(&deal).unwrap();
        let cache = ReservationCache::new(ledger.clone());
        let now = Utc::now();

        cache.try_reserve(&deal.id, "u-1", now).await.unwrap();
        cache.evict(&deal.id).await;

        // Cache-only reservation was lost; ledger still shows 2 remaining,
        // so rehydration starts fresh.
        assert_eq!(
            cache.try_reserve(&deal.id, "u-2", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-3", now).await.unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            cache.try_reserve(&deal.id, "u-4", now).await.unwrap(),
            ReserveOutcome::SoldOut
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reservations_never_overgrant() {
        let deal = live_deal(10);
        let cache = Arc::new(primed_cache(&deal).await);
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..50 {
            let cache = cache.clone();
            let deal_id = deal.id.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .try_reserve(&deal_id, &format!("u-{i}"), now)
                    .await
                    .unwrap()
            }));
        }

        let mut reserved = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ReserveOutcome::Reserved => reserved += 1,
                ReserveOutcome::SoldOut => sold_out += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(reserved, 10);
        assert_eq!(sold_out, 40);
    }
}
