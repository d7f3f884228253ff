//! Human-like send delays.
//!
//! A reply waits `clamp(len·25ms, 400ms, 4000ms)` before its first chunk
//! and `clamp(len·8ms, 300ms, 1500ms)` between consecutive chunks, each
//! with ±15 % jitter.

use std::time::Duration;

use rand::Rng;

const JITTER_FRACTION: f64 = 0.15;

pub fn pre_send_delay(len: usize) -> Duration {
    jittered(clamp_ms(len as u64 * 25, 400, 4000))
}

pub fn inter_chunk_delay(len: usize) -> Duration {
    jittered(clamp_ms(len as u64 * 8, 300, 1500))
}

fn clamp_ms(ms: u64, lo: u64, hi: u64) -> u64 {
    ms.clamp(lo, hi)
}

fn jittered(base_ms: u64) -> Duration {
    let spread = (base_ms as f64 * JITTER_FRACTION) as i64;
    let offset = if spread == 0 {
        0
    } else {
        rand::thread_rng().gen_range(-spread..=spread)
    };
    Duration::from_millis((base_ms as i64 + offset).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_send_delay_stays_in_jittered_bounds() {
        for _ in 0..1000 {
            // 100 chars → 2500ms base, ±15 %.
            let d = pre_send_delay(100).as_millis() as u64;
            assert!((2125..=2875).contains(&d), "out of bounds: {d}");
        }
    }

    #[test]
    fn short_and_long_replies_hit_the_clamps() {
        for _ in 0..100 {
            let short = pre_send_delay(1).as_millis() as u64;
            assert!((340..=460).contains(&short));
            let long = pre_send_delay(100_000).as_millis() as u64;
            assert!((3400..=4600).contains(&long));
        }
    }

    #[test]
    fn inter_chunk_delay_is_shorter() {
        for _ in 0..100 {
            let d = inter_chunk_delay(100_000).as_millis() as u64;
            assert!(d <= 1725);
        }
    }
}
