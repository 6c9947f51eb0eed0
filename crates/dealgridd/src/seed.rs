//! Seed the ledger with sample deals for local development.

use std::path::Path;

use chrono::{TimeDelta, Utc};
use tracing::info;

use dealgrid_ledger::{Deal, GeoPoint, Ledger};

/// Sample deals around Mumbai and Delhi, including expired ones so the
/// discovery filters have something to exclude.
fn sample_deals() -> Vec<Deal> {
    let now = Utc::now();
    vec![
        Deal::new(
            "merchant-sandwich-house-001",
            "Flat 50% Off on Grilled Sandwiches",
            100,
            now + TimeDelta::days(7),
            GeoPoint {
                lat: 19.0760,
                lng: 72.8777,
            },
            now,
        ),
        Deal::new(
            "merchant-gadget-zone-001",
            "20% OFF iPhone Claim Sale",
            50,
            now + TimeDelta::days(2),
            GeoPoint {
                lat: 19.0780,
                lng: 72.8777,
            },
            now,
        ),
        Deal::new(
            "merchant-gadget-zone-001",
            "DSLR Camera 30% Off - Expired Deal",
            50,
            now - TimeDelta::days(2),
            GeoPoint {
                lat: 19.0750,
                lng: 72.8800,
            },
            now - TimeDelta::days(9),
        ),
        Deal::new(
            "merchant-delhi-brunch-002",
            "Delhi Brunch Grand Opening",
            10,
            now + TimeDelta::days(14),
            GeoPoint {
                lat: 28.7041,
                lng: 77.1025,
            },
            now,
        ),
    ]
}

/// Insert the sample deals into the ledger at `data_dir`.
pub fn run(data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("dealgrid.redb");
    let ledger = Ledger::open(&db_path)?;

    let now = Utc::now();
    let deals = sample_deals();
    let mut active = 0;
    for deal in &deals {
        ledger.create_deal(deal)?;
        if deal.is_claimable(now) {
            active += 1;
        }
        info!(
            deal_id = %deal.id,
            title = %deal.title,
            inventory = deal.inventory_remaining,
            claimable = deal.is_claimable(now),
            "seeded deal"
        );
    }

    info!(
        total = deals.len(),
        active,
        expired = deals.len() - active,
        "seeding complete"
    );
    info!("try: curl \"http://localhost:8080/api/deals?lat=19.0760&long=72.8777&radius=5\"");
    Ok(())
}
