//! redb table definitions for the DealGrid ledger.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Index tables map a uniqueness key to the owning claim id and are
//! maintained inside the same write transaction as the records they index.

use redb::TableDefinition;

/// Deal records keyed by `{deal_id}`.
pub const DEALS: TableDefinition<&str, &[u8]> = TableDefinition::new("deals");

/// Claim records keyed by `{claim_id}`.
pub const CLAIMS: TableDefinition<&str, &[u8]> = TableDefinition::new("claims");

/// Claim id keyed by `{deal_id}:{user_id}` — enforces at most one claim
/// per (deal, user) pair.
pub const CLAIMS_BY_USER: TableDefinition<&str, &str> = TableDefinition::new("claims_by_user");

/// Claim id keyed by `{voucher_code}` — enforces global voucher-code
/// uniqueness.
pub const VOUCHER_CODES: TableDefinition<&str, &str> = TableDefinition::new("voucher_codes");

/// Claim id keyed by `{merchant_id}:{claim_id}` — merchant-side listing
/// via prefix scan.
pub const MERCHANT_CLAIMS: TableDefinition<&str, &str> = TableDefinition::new("merchant_claims");
