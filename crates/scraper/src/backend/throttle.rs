// ABOUTME: Per-host politeness throttle for the light backend with jittered delays and adaptive backoff.
// ABOUTME: Serializes requests to one host while leaving distinct hosts independent.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::options::ThrottleConfig;

/// Smallest delay a backoff starts from, so a zero base delay still backs off.
const BACKOFF_FLOOR: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct HostState {
    current_delay: Duration,
    last_request: Option<Instant>,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl HostState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }
}

/// Snapshot of one host's throttle state.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

/// Adaptive per-host throttle.
///
/// Each host has its own async mutex; holding a [`HostPermit`] is holding that
/// host's lock, so at most one request per host is in flight.
#[derive(Debug, Clone)]
pub struct HostThrottle {
    config: ThrottleConfig,
    hosts: Arc<DashMap<String, Arc<Mutex<HostState>>>>,
}

impl HostThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config: config.sanitized(),
            hosts: Arc::new(DashMap::new()),
        }
    }

    /// Waits for the host's turn, then marks a request as started.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let host = host.to_lowercase();
        let slot = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(HostState::new(self.config.base_delay))))
            .clone();

        let mut state = slot.lock_owned().await;

        let wait = match state.last_request {
            Some(last) => self.jittered(state.current_delay).saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };
        if !wait.is_zero() {
            debug!(host = %host, wait_ms = wait.as_millis() as u64, "throttling request");
            tokio::time::sleep(wait).await;
        }

        state.last_request = Some(Instant::now());
        state.total_requests += 1;

        HostPermit {
            host,
            config: self.config.clone(),
            state,
        }
    }

    /// Current state for a host, if it has been seen.
    ///
    /// Returns `None` while a request to that host is in flight.
    pub fn stats(&self, host: &str) -> Option<HostStats> {
        let slot = self.hosts.get(&host.to_lowercase())?.clone();
        let state = slot.try_lock().ok()?;
        Some(HostStats {
            current_delay: state.current_delay,
            in_backoff: state.in_backoff,
            total_requests: state.total_requests,
            rate_limit_hits: state.rate_limit_hits,
        })
    }

    /// Forgets hosts idle for longer than the configured expiry.
    ///
    /// Hosts that are in flight, awaited or backing off are kept.
    pub fn prune_idle(&self) -> usize {
        let before = self.hosts.len();
        let expiry = self.config.idle_expiry;
        self.hosts.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => {
                    state.in_backoff || state.last_request.map_or(false, |t| t.elapsed() < expiry)
                }
                Err(_) => true,
            }
        });
        before.saturating_sub(self.hosts.len())
    }

    pub fn tracked_hosts(&self) -> usize {
        self.hosts.len()
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let jitter = self.config.jitter;
        if jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor)
    }
}

impl Default for HostThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

/// Exclusive right to send one request to a host. Released on drop.
#[derive(Debug)]
pub struct HostPermit {
    host: String,
    config: ThrottleConfig,
    state: OwnedMutexGuard<HostState>,
}

impl HostPermit {
    /// Feeds the response status back into the host's delay.
    pub fn record_status(&mut self, status: u16) {
        if matches!(status, 429 | 503) {
            self.record_rate_limit(status);
        } else if (200..400).contains(&status) {
            self.record_success();
        }
    }

    fn record_rate_limit(&mut self, status: u16) {
        let state = &mut *self.state;
        state.rate_limit_hits += 1;
        state.in_backoff = true;
        let grown = state.current_delay.max(BACKOFF_FLOOR).as_secs_f64()
            * self.config.backoff_multiplier;
        state.current_delay = Duration::try_from_secs_f64(grown)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay));
        warn!(
            host = %self.host,
            status,
            delay_ms = state.current_delay.as_millis() as u64,
            "rate limited, backing off"
        );
    }

    fn record_success(&mut self) {
        let state = &mut *self.state;
        if !state.in_backoff {
            return;
        }
        let shrunk = state.current_delay.mul_f64(self.config.recovery_multiplier);
        if shrunk <= self.config.base_delay.max(BACKOFF_FLOOR) {
            state.current_delay = self.config.base_delay;
            state.in_backoff = false;
            info!(host = %self.host, "recovered from backoff");
        } else {
            state.current_delay = shrunk;
            debug!(
                host = %self.host,
                delay_ms = shrunk.as_millis() as u64,
                "backoff delay reduced"
            );
        }
    }
}
