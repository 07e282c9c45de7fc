use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Client-side record id. `Uuid::new_v4` panics when the OS random source
/// is unavailable; in that case a time-based id is used instead.
pub fn new_id() -> String {
    match std::panic::catch_unwind(Uuid::new_v4) {
        Ok(u) => u.to_string(),
        Err(_) => fallback_id(),
    }
}

/// `<unix millis>-<mixed bits>`, both base36.
pub fn fallback_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let n = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let seed = millis
        ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (u64::from(std::process::id()) << 32);
    format!("{}-{}", base36(millis), base36(splitmix64(seed)))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn base36(mut v: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if v == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while v > 0 {
        out.push(DIGITS[(v % 36) as usize]);
        v /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
