use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use mnemora_relational::Limits;

use crate::error::{AuthError, Result};

const BUCKET_RETENTION_MINUTES: i64 = 2;

struct MinuteBucket {
    epoch_minute: i64,
    requests: u32,
    tokens: u32,
}

struct KeyState {
    buckets: Mutex<Vec<MinuteBucket>>,
    concurrency: AtomicU32,
    last_purge_minute: AtomicI64,
}

impl KeyState {
    fn new() -> Self {
        Self {
            buckets: Mutex::new(Vec::new()),
            concurrency: AtomicU32::new(0),
            last_purge_minute: AtomicI64::new(0),
        }
    }
}

fn current_epoch_minute() -> i64 {
    Utc::now().timestamp() / 60
}

/// Per-process, per-key rate limiter. Buckets are keyed by
/// `(key_id, current_epoch_minute)`; a separate atomic tracks live
/// concurrency per key. Limits are per-process by design — a clustered
/// deployment needs a shared counter instead, which is left out of scope here.
pub struct RateLimiter {
    keys: DashMap<String, KeyState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { keys: DashMap::new() }
    }

    /// Atomically checks RPM, TPM, and concurrency against `limits`, and on
    /// success increments all three. Checks run in order: RPM,
    /// then TPM, then concurrency. Opportunistically purges buckets older
    /// than `BUCKET_RETENTION_MINUTES`.
    pub fn allow_request(&self, key_id: &str, estimated_tokens: u32, limits: &Limits) -> Result<()> {
        let state = self.keys.entry(key_id.to_string()).or_insert_with(KeyState::new);
        let now_minute = current_epoch_minute();

        let mut buckets = state.buckets.lock().expect("rate limiter bucket lock poisoned");
        self.purge_stale(&state, &mut buckets, now_minute);

        let (requests, tokens) = match buckets.iter().find(|b| b.epoch_minute == now_minute) {
            Some(b) => (b.requests, b.tokens),
            None => (0, 0),
        };

        if requests + 1 > limits.rpm {
            return Err(AuthError::RateLimited);
        }
        if tokens + estimated_tokens > limits.tpm {
            return Err(AuthError::RateLimited);
        }
        if state.concurrency.load(Ordering::SeqCst) + 1 > limits.concurrency {
            return Err(AuthError::RateLimited);
        }

        match buckets.iter_mut().find(|b| b.epoch_minute == now_minute) {
            Some(b) => {
                b.requests += 1;
                b.tokens += estimated_tokens;
            }
            None => buckets.push(MinuteBucket {
                epoch_minute: now_minute,
                requests: 1,
                tokens: estimated_tokens,
            }),
        }
        state.concurrency.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Decrements concurrency only; request/token buckets are left to expire.
    pub fn end_request(&self, key_id: &str) {
        if let Some(state) = self.keys.get(key_id) {
            let _ = state
                .concurrency
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)));
        }
    }

    fn purge_stale(&self, state: &KeyState, buckets: &mut Vec<MinuteBucket>, now_minute: i64) {
        if state.last_purge_minute.swap(now_minute, Ordering::SeqCst) == now_minute {
            return;
        }
        buckets.retain(|b| now_minute - b.epoch_minute <= BUCKET_RETENTION_MINUTES);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: u32) -> Limits {
        Limits { rpm, tpm: 1_000_000, concurrency: 100 }
    }

    #[test]
    fn admits_exactly_rpm_requests_then_denies() {
        let limiter = RateLimiter::new();
        let l = limits(5);
        let mut admitted = 0;
        let mut denied = 0;
        for _ in 0..10 {
            match limiter.allow_request("k1", 1, &l) {
                Ok(()) => admitted += 1,
                Err(_) => denied += 1,
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(denied, 5);
    }

    #[test]
    fn tpm_limit_denies_when_estimate_exceeds_budget() {
        let limiter = RateLimiter::new();
        let l = Limits { rpm: 100, tpm: 50, concurrency: 100 };
        assert!(limiter.allow_request("k2", 30, &l).is_ok());
        assert!(limiter.allow_request("k2", 30, &l).is_err());
    }

    #[test]
    fn concurrency_limit_denies_beyond_cap_until_end_request() {
        let limiter = RateLimiter::new();
        let l = Limits { rpm: 100, tpm: 1_000_000, concurrency: 1 };
        assert!(limiter.allow_request("k3", 1, &l).is_ok());
        assert!(limiter.allow_request("k3", 1, &l).is_err());
        limiter.end_request("k3");
        assert!(limiter.allow_request("k3", 1, &l).is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let l = limits(1);
        assert!(limiter.allow_request("a", 1, &l).is_ok());
        assert!(limiter.allow_request("b", 1, &l).is_ok());
    }
}
