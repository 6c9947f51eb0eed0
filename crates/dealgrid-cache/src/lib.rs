//! dealgrid-cache — in-process caches in front of the durable ledger.
//!
//! Two independent caches live here:
//!
//! - [`ReservationCache`]: the fast-path reservation store that
//!   adjudicates claim races per deal in O(1) under a per-deal lock.
//!   Its state is a cache of ledger truth and may be lost at any time;
//!   correctness is preserved by lazy rehydration plus the engine's
//!   compensation protocol.
//! - [`DiscoveryCache`]: a short-TTL snapshot cache over the ledger's
//!   proximity query. Staleness here only affects what is shown, never
//!   what is claimable.

mod discovery;
mod reservation;

pub use discovery::{DiscoveryCache, DiscoveryConfig, NearbyDeal, Source};
pub use reservation::{ReservationCache, ReserveOutcome};
