//! Voucher code generation.
//!
//! Codes are human-readable and collision-resistant, not collision-proof:
//! global uniqueness is enforced by the ledger's voucher-code index, the
//! generator only makes collisions statistically negligible.

use rand::Rng;

/// Fixed namespace marker for all DealGrid vouchers.
const NAMESPACE: &str = "DG";

/// Generate a voucher code for a deal.
///
/// Layout: `DG-{deal suffix}-{base36 millis}{hex entropy}` — the deal
/// suffix spreads codes across deals, the timestamp component keeps codes
/// roughly sortable by issue time, and the random tail prevents guessing.
pub fn generate_voucher_code(deal_id: &str) -> String {
    let suffix: String = deal_id
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<String>()
        .to_uppercase();
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    let entropy: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{NAMESPACE}-{suffix}-{}{entropy:06X}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
