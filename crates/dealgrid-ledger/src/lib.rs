//! dealgrid-ledger — durable ledger for deals and claims.
//!
//! The ledger is the authoritative record store: deals with bounded voucher
//! inventory, and one claim per granted voucher. All mutations run inside
//! redb write transactions; the claim commit re-verifies every business rule
//! against durable state before touching it, so the ledger stays correct
//! even when the fast-path cache in front of it has drifted.

mod error;
mod geo;
mod store;
mod tables;
mod types;

pub use error::{LedgerError, LedgerResult};
pub use geo::haversine_km;
pub use store::Ledger;
pub use types::*;
