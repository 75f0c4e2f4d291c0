pub mod advancer;
pub mod backoff;
pub mod lease;
pub mod retry;
pub mod types;

pub use advancer::{AdvanceOutcome, RunAdvancer};
pub use backoff::BackoffPolicy;
pub use lease::{LeaseManager, LeaseOutcome};
pub use retry::{RetryOutcome, request_retry};

/// Engine tuning knobs. Defaults follow the reference policy: a 25 s
/// lease, 2 s backoff base, 120 s backoff cap.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// How long an acquired lease stays exclusive before a crashed
    /// runner's claim can be reclaimed.
    pub lease_ms: i64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound on a single executor invocation. A stuck executor
    /// otherwise holds the lease until it expires.
    pub step_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_ms: lease::DEFAULT_LEASE_MS,
            base_delay_ms: backoff::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: backoff::DEFAULT_MAX_DELAY_MS,
            step_timeout_ms: None,
        }
    }
}
