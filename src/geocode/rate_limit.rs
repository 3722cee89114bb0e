//! Sliding-window rate limiter for external geocoding requests.
//!
//! One limiter is shared by every caller of a provider, so the ceiling holds
//! system-wide no matter how many sessions are interacting. After a 429 the
//! limiter also holds back new requests with exponential backoff; it never
//! replays the rejected request itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Longest cool-down applied after repeated 429 responses.
const MAX_BACKOFF_EXPONENT: u32 = 4;

#[derive(Debug)]
struct WindowState {
    request_times: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

/// Allows at most `max_requests` request starts per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    state: Mutex<WindowState>,
    consecutive_429s: AtomicU32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            state: Mutex::new(WindowState {
                request_times: VecDeque::with_capacity(max_requests + 1),
                blocked_until: None,
            }),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    /// One request per `interval`.
    pub fn with_min_interval(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    /// Wait until a request may start, then reserve its slot.
    ///
    /// Returns the reservation, which [`RateLimiter::release`] hands back
    /// when the request is not sent after all.
    pub async fn acquire(&self) -> Instant {
        loop {
            let (now, wait) = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                // Prune requests outside the window
                let window = self.window;
                while state
                    .request_times
                    .front()
                    .map_or(false, |&t| now.duration_since(t) >= window)
                {
                    state.request_times.pop_front();
                }

                let blocked_until = state.blocked_until;
                let wait = match blocked_until {
                    Some(until) if until > now => Some(until - now),
                    _ if state.request_times.len() >= self.max_requests => state
                        .request_times
                        .front()
                        .map(|&oldest| (oldest + window).saturating_duration_since(now)),
                    _ => {
                        state.blocked_until = None;
                        state.request_times.push_back(now);
                        None
                    }
                };
                (now, wait)
            };

            match wait {
                Some(duration) => {
                    debug!("[RateLimiter] Waiting {:?}", duration);
                    tokio::time::sleep(duration).await;
                }
                None => return now,
            }
        }
    }

    /// Give back a slot reserved by [`RateLimiter::acquire`].
    pub async fn release(&self, reservation: Instant) {
        let mut state = self.state.lock().await;
        if let Some(index) = state.request_times.iter().position(|&t| t == reservation) {
            state.request_times.remove(index);
        }
    }

    /// Time left before the cool-down after a 429 ends.
    pub async fn cooldown_remaining(&self) -> Duration {
        let state = self.state.lock().await;
        state
            .blocked_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(Instant::now()))
    }

    /// Note a successful response.
    pub fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    /// Note a 429 and hold back new requests. Returns the cool-down applied.
    pub async fn record_rate_limited(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 2s, 4s, 8s, 16s
        let backoff = Duration::from_millis(1000 * (1 << count.min(MAX_BACKOFF_EXPONENT)));
        let mut state = self.state.lock().await;
        state.blocked_until = Some(Instant::now() + backoff);
        backoff
    }
}
