//! Tests for the jittered exponential backoff calculator.

use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use stepline::clock::{Clock, ManualClock};
use stepline::engine::BackoffPolicy;
use stepline::engine::backoff::deadline_from_now;

fn policy(base: u64, max: u64) -> BackoffPolicy {
    BackoffPolicy {
        base_delay_ms: base,
        max_delay_ms: max,
    }
}

#[test]
fn jitter_stays_within_bounds() {
    let policy = policy(1_000, u64::MAX);

    for seed in 0..50u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        for attempt in 1..=6u32 {
            let raw = 1_000u64 * (1 << (attempt - 1));
            let delay = policy.delay_ms(attempt, &mut rng);

            let lower = (raw as f64 * 0.75) as u64;
            let upper = (raw as f64 * 1.25) as u64;
            assert!(
                delay >= lower && delay <= upper,
                "attempt {}: delay {} outside [{}, {}]",
                attempt,
                delay,
                lower,
                upper
            );
        }
    }
}

#[test]
fn consecutive_attempts_double_with_same_jitter() {
    let policy = policy(500, u64::MAX);

    for attempt in 1..=5u32 {
        // Re-seed so both attempts draw the identical jitter factor.
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);

        let this = policy.delay_ms(attempt, &mut rng_a);
        let next = policy.delay_ms(attempt + 1, &mut rng_b);

        // Integer truncation can shave at most a millisecond.
        assert!(
            next >= this * 2 - 1 && next <= this * 2 + 1,
            "attempt {}: {} then {}",
            attempt,
            this,
            next
        );
    }
}

#[test]
fn delay_never_exceeds_cap() {
    let policy = policy(60_000, 120_000);

    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        for attempt in 1..=30u32 {
            assert!(policy.delay_ms(attempt, &mut rng) <= 120_000);
        }
    }

    // Deep attempts saturate at exactly the cap: even the smallest
    // jitter draw puts the raw delay far beyond it.
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(policy.delay_ms(10, &mut rng), 120_000);
}

#[test]
fn attempt_zero_is_treated_as_one() {
    let policy = policy(1_000, u64::MAX);

    let mut rng_a = StdRng::seed_from_u64(3);
    let mut rng_b = StdRng::seed_from_u64(3);

    assert_eq!(
        policy.delay_ms(0, &mut rng_a),
        policy.delay_ms(1, &mut rng_b)
    );
}

#[test]
fn huge_attempt_numbers_do_not_overflow() {
    let policy = policy(u64::MAX / 2, 120_000);
    let mut rng = StdRng::seed_from_u64(0);

    assert_eq!(policy.delay_ms(u32::MAX, &mut rng), 120_000);
}

#[test]
fn deadline_is_relative_to_injected_clock() {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);

    let deadline = deadline_from_now(&clock, 5_000);
    assert_eq!(deadline, start + chrono::Duration::milliseconds(5_000));

    clock.advance(chrono::Duration::seconds(10));
    let later = deadline_from_now(&clock, 5_000);
    assert_eq!(later, clock.now() + chrono::Duration::milliseconds(5_000));
}
