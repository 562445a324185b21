//! Sliding-window admission control.
//!
//! Every question is checked against two independent 60-second windows
//! (one keyed by patient identity, one by client IP) and admitted only if
//! both have capacity. Most-restrictive-wins bounds both per-user and
//! per-network abuse of the model provider.
//!
//! Two backends share the same decision contract: an in-process store for
//! single-instance deployments and a Redis store whose expire-count-insert
//! sequence runs as one atomically evaluated script for multi-process
//! deployments.

mod memory;
mod redis_store;

pub use memory::MemoryRateLimiter;
pub use redis_store::RedisRateLimiter;

/// Window length. Entries older than this are logically expired.
pub(crate) const WINDOW_MS: i64 = 60_000;

/// Key time-to-live, slightly longer than the window so idle keys are
/// garbage-collected rather than retained indefinitely.
pub(crate) const KEY_TTL_SECS: i64 = 70;

/// Which window rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Patient,
    Ip,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Patient => "patient",
            KeyKind::Ip => "ip",
        }
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Admitted,
    Rejected {
        /// Seconds until the oldest surviving entry leaves the window.
        retry_after_secs: u64,
        /// The window that ran out of capacity (patient wins ties).
        key_kind: KeyKind,
    },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admitted)
    }
}

/// Rate limiter backends behind one admission call.
///
/// Selected at startup from configuration: a Redis URL selects the shared
/// store, otherwise the in-process store serves a single instance.
pub enum RateLimiter {
    Memory(MemoryRateLimiter),
    Redis(RedisRateLimiter),
}

impl RateLimiter {
    /// Check both windows and record the attempt if admitted.
    ///
    /// A shared-store outage admits the request with an error log: the
    /// limiter protects provider capacity, and the safety gates that
    /// protect patients still run either way.
    pub async fn allow(&self, patient_id: &str, ip: &str) -> RateDecision {
        match self {
            RateLimiter::Memory(limiter) => limiter.allow(patient_id, ip),
            RateLimiter::Redis(limiter) => match limiter.allow(patient_id, ip).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(error = %err, "Rate limit store unavailable, admitting");
                    RateDecision::Admitted
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_labels() {
        assert_eq!(KeyKind::Patient.as_str(), "patient");
        assert_eq!(KeyKind::Ip.as_str(), "ip");
    }

    #[tokio::test]
    async fn memory_backend_dispatches() {
        let limiter = RateLimiter::Memory(MemoryRateLimiter::new(2, 10));
        assert!(limiter.allow("p1", "10.0.0.1").await.is_admitted());
        assert!(limiter.allow("p1", "10.0.0.1").await.is_admitted());
        assert!(!limiter.allow("p1", "10.0.0.1").await.is_admitted());
    }
}
