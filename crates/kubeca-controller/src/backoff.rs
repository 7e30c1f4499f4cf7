//! Per-object requeue backoff
//!
//! `error_policy` has no memory of its own, so attempt counts are kept here,
//! keyed by request name. A successful reconcile clears the entry. Objects
//! deleted while failing are never reconciled again, so entries idle for
//! longer than any requeue could take are pruned on the next failure.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

/// Exponential backoff parameters for failed reconciles
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound before jitter
    pub max_delay: Duration,
    /// Multiplier per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before jitter for the given 1-based attempt
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Failures {
    count: u32,
    last: Instant,
}

/// Consecutive failure counts per request name
#[derive(Debug, Default)]
pub struct ObjectBackoff {
    config: BackoffConfig,
    attempts: DashMap<String, Failures>,
}

impl ObjectBackoff {
    /// Create a tracker with the given parameters
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
        }
    }

    /// Record a failure for `name` and return the jittered delay before the next attempt
    pub fn next_delay(&self, name: &str) -> Duration {
        self.next_delay_at(name, Instant::now())
    }

    fn next_delay_at(&self, name: &str, now: Instant) -> Duration {
        self.prune_idle(now);
        let attempt = {
            let mut entry = self.attempts.entry(name.to_string()).or_insert(Failures {
                count: 0,
                last: now,
            });
            entry.count = entry.count.saturating_add(1);
            entry.last = now;
            entry.count
        };
        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(self.config.base_delay(attempt).as_secs_f64() * jitter)
    }

    /// Forget failures for `name`
    pub fn reset(&self, name: &str) {
        self.attempts.remove(name);
    }

    /// Consecutive failures recorded for `name`
    pub fn attempts(&self, name: &str) -> u32 {
        self.attempts.get(name).map(|a| a.count).unwrap_or(0)
    }

    /// Longest a failing object can go without a new failure or a reset:
    /// the jittered max delay, with headroom for the attempt itself
    fn idle_ttl(&self) -> Duration {
        self.config.max_delay.saturating_mul(3)
    }

    fn prune_idle(&self, now: Instant) {
        let ttl = self.idle_ttl();
        self.attempts
            .retain(|_, f| now.saturating_duration_since(f.last) <= ttl);
    }

    /// Parameters in use
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
