//! dealgrid-engine — the claim engine.
//!
//! Orchestrates a claim attempt through its state machine:
//!
//! ```text
//! START → FAST_RESERVED → { DURABLE_COMMITTED | COMPENSATED }
//! ```
//!
//! The fast-path reservation adjudicates the race; the durable commit
//! re-verifies and records the grant; every non-committed exit after a
//! successful reservation releases it — a reservation with no durable
//! claim behind it would burn a voucher slot forever.

mod engine;
mod voucher;

pub use engine::{ClaimEngine, ClaimError, CodeGenerator, RedeemError};
pub use voucher::generate_voucher_code;
