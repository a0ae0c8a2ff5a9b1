use std::time::{Duration, SystemTime};

/// Short base36 identifier used to correlate the log lines of one request.
pub fn create_request_id() -> String {
    let mut seed = [0u8; 8];
    let random = match getrandom::getrandom(&mut seed) {
        Ok(()) => u64::from_le_bytes(seed) as u128,
        Err(_) => std::process::id() as u128,
    };
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let mix = now.as_nanos() ^ random;
    // base36 encode last 40 bits for brevity
    base36((mix & 0xff_ffff_ffff) as u64)
}

fn base36(mut v: u64) -> String {
    let alphabet = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if v == 0 {
        return "0".to_string();
    }
    let mut s = String::new();
    while v > 0 {
        s.push(alphabet[(v % 36) as usize] as char);
        v /= 36;
    }
    s.chars().rev().collect()
}
