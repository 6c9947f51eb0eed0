//! Discovery cache — short-TTL snapshots of the ledger's proximity query.
//!
//! Keys quantize the query coordinates so near-identical queries share one
//! entry; the granularity is a tunable, not a contract. Entries expire on
//! a fixed wall-clock TTL independent of deal expiry: discovery staleness
//! only affects what is shown, never what is claimable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use dealgrid_ledger::{Deal, GeoPoint, Ledger, LedgerResult};

/// Tunables for the discovery cache.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Snapshot lifetime.
    pub ttl: Duration,
    /// Coordinate quantization step in degrees (~110 m per 1e-3 at the
    /// equator).
    pub quantization: f64,
    /// Result cap per query.
    pub max_results: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            quantization: 1e-3,
            max_results: 50,
        }
    }
}

/// Where a discovery response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Store,
}

/// A deal enriched with its distance from the query point.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NearbyDeal {
    pub deal_id: String,
    pub merchant_id: String,
    pub title: String,
    pub total_vouchers: u32,
    pub inventory_remaining: u32,
    pub valid_until: DateTime<Utc>,
    pub location: GeoPoint,
    /// Great-circle distance in km, rounded to 2 decimals for display.
    pub distance_km: f64,
}

impl NearbyDeal {
    fn from_scored(deal: Deal, distance_km: f64) -> Self {
        Self {
            deal_id: deal.id,
            merchant_id: deal.merchant_id,
            title: deal.title,
            total_vouchers: deal.total_vouchers,
            inventory_remaining: deal.inventory_remaining,
            valid_until: deal.valid_until,
            location: deal.location,
            distance_km: (distance_km * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DiscoveryKey {
    lat_q: i64,
    lng_q: i64,
    radius_km: u32,
}

struct CachedSnapshot {
    stored_at: Instant,
    deals: Vec<NearbyDeal>,
}

/// Cache-aside layer over the ledger's geospatial query.
pub struct DiscoveryCache {
    ledger: Ledger,
    config: DiscoveryConfig,
    entries: Mutex<HashMap<DiscoveryKey, CachedSnapshot>>,
}

impl DiscoveryCache {
    /// Create a discovery cache over the given ledger.
    pub fn new(ledger: Ledger, config: DiscoveryConfig) -> Self {
        Self {
            ledger,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, lat: f64, lng: f64, radius_km: u32) -> DiscoveryKey {
        let q = self.config.quantization;
        DiscoveryKey {
            lat_q: (lat / q).round() as i64,
            lng_q: (lng / q).round() as i64,
            radius_km,
        }
    }

    /// Serve "claimable deals within `radius_km` of (lat, lng)".
    ///
    /// Returns the snapshot plus where it came from. Cache misses query
    /// the ledger, enrich each hit with its distance, and store the
    /// snapshot for the configured TTL.
    pub async fn discover(
        &self,
        lat: f64,
        lng: f64,
        radius_km: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<(Source, Vec<NearbyDeal>)> {
        let key = self.key(lat, lng, radius_km);

        {
            let entries = self.entries.lock().await;
            if let Some(snapshot) = entries.get(&key) {
                if snapshot.stored_at.elapsed() <= self.config.ttl {
                    debug!(lat, lng, radius_km, "discovery served from cache");
                    return Ok((Source::Cache, snapshot.deals.clone()));
                }
            }
        }

        let origin = GeoPoint { lat, lng };
        let scored = self.ledger.find_nearby(
            &origin,
            f64::from(radius_km),
            self.config.max_results,
            now,
        )?;
        let deals: Vec<NearbyDeal> = scored
            .into_iter()
            .map(|(deal, distance)| NearbyDeal::from_scored(deal, distance))
            .collect();

        let mut entries = self.entries.lock().await;
        // Lazy pruning keeps the map bounded without a sweeper task.
        let ttl = self.config.ttl;
        entries.retain(|_, snapshot| snapshot.stored_at.elapsed() <= ttl);
        entries.insert(
            key,
            CachedSnapshot {
                stored_at: Instant::now(),
                deals: deals.clone(),
            },
        );
        debug!(lat, lng, radius_km, count = deals.len(), "discovery served from store");
        Ok((Source::Store, deals))
    }
}
