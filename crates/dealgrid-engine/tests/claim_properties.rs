//! Concurrency properties of the claim engine.
//!
//! These tests run many claim attempts in parallel against one deal and
//! assert the engine's core guarantees: no over-grant, no double-grant,
//! and exact inventory accounting in both the ledger and the fast path.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use dealgrid_cache::ReservationCache;
use dealgrid_engine::{ClaimEngine, ClaimError};
use dealgrid_ledger::{Deal, GeoPoint, Ledger, RejectReason};

fn live_deal(total: u32) -> Deal {
    let now = Utc::now();
    Deal::new(
        "m-stress",
        "Contended deal",
        total,
        now + TimeDelta::hours(2),
        GeoPoint {
            lat: 19.0760,
            lng: 72.8777,
        },
        now,
    )
}

fn build_engine(deal: &Deal) -> (Ledger, Arc<ClaimEngine>) {
    let ledger = Ledger::open_in_memory().unwrap();
    ledger.create_deal(deal).unwrap();
    let reservations = Arc::new(ReservationCache::new(ledger.clone()));
    let engine = Arc::new(ClaimEngine::new(ledger.clone(), reservations));
    (ledger, engine)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn n_users_against_k_vouchers_grants_exactly_k() {
    const K: u32 = 10;
    const N: usize = 50;

    let deal = live_deal(K);
    let (ledger, engine) = build_engine(&deal);

    let mut handles = Vec::new();
    for i in 0..N {
        let engine = engine.clone();
        let deal_id = deal.id.clone();
        handles.push(tokio::spawn(async move {
            engine.claim(&deal_id, &format!("user-{i}")).await
        }));
    }

    let mut committed = Vec::new();
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(claim) => committed.push(claim),
            Err(ClaimError::Rejected(RejectReason::SoldOut)) => sold_out += 1,
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }

    assert_eq!(committed.len(), K as usize);
    assert_eq!(sold_out, N - K as usize);

    // Every winner holds a distinct voucher code.
    let mut codes: Vec<_> = committed.iter().map(|c| c.voucher_code.clone()).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), K as usize);

    // Ledger accounting is exact.
    let stored = ledger.get_deal(&deal.id).unwrap().unwrap();
    assert_eq!(stored.inventory_remaining, 0);
    assert_eq!(stored.claimed_by.len(), K as usize);
    stored.check_invariants().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_double_claim_grants_exactly_once() {
    let deal = live_deal(10);
    let (ledger, engine) = build_engine(&deal);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        let deal_id = deal.id.clone();
        handles.push(tokio::spawn(
            async move { engine.claim(&deal_id, "greedy").await },
        ));
    }

    let mut grants = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => grants += 1,
            Err(ClaimError::Rejected(RejectReason::AlreadyClaimed)) => already += 1,
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }

    assert_eq!(grants, 1);
    assert_eq!(already, 19);

    let stored = ledger.get_deal(&deal.id).unwrap().unwrap();
    assert_eq!(stored.inventory_remaining, 9);
    assert_eq!(stored.claimed_by, vec!["greedy".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_voucher_race_has_one_winner() {
    let deal = live_deal(1);
    let (ledger, engine) = build_engine(&deal);

    let a = {
        let engine = engine.clone();
        let deal_id = deal.id.clone();
        tokio::spawn(async move { engine.claim(&deal_id, "user-a").await })
    };
    let b = {
        let engine = engine.clone();
        let deal_id = deal.id.clone();
        tokio::spawn(async move { engine.claim(&deal_id, "user-b").await })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let winners: Vec<_> = outcomes.iter().filter(|o| o.is_ok()).collect();
    let losers: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, Err(ClaimError::Rejected(RejectReason::SoldOut))))
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 1);

    // The winner's code matches the generator's format.
    let Ok(claim) = winners[0] else { unreachable!() };
    let parts: Vec<&str> = claim.voucher_code.split('-').collect();
    assert_eq!(parts[0], "DG");
    assert_eq!(parts.len(), 3);

    let stored = ledger.get_deal(&deal.id).unwrap().unwrap();
    assert_eq!(stored.inventory_remaining, 0);
    assert_eq!(stored.claimed_by.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn repeated_contention_rounds_stay_exact() {
    // Several deals drained concurrently; every deal ends exactly empty.
    for round in 0..3 {
        let deal = live_deal(5);
        let (ledger, engine) = build_engine(&deal);

        let mut handles = Vec::new();
        for i in 0..25 {
            let engine = engine.clone();
            let deal_id = deal.id.clone();
            handles.push(tokio::spawn(async move {
                engine.claim(&deal_id, &format!("r{round}-u{i}")).await
            }));
        }
        let grants = {
            let mut grants = 0;
            for handle in handles {
                if handle.await.unwrap().is_ok() {
                    grants += 1;
                }
            }
            grants
        };
        assert_eq!(grants, 5, "round {round}");

        let stored = ledger.get_deal(&deal.id).unwrap().unwrap();
        assert_eq!(stored.inventory_remaining, 0);
        stored.check_invariants().unwrap();
    }
}
