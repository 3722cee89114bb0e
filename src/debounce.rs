//! Debounced lookup scheduling.
//!
//! Interactive sources (marker drags, rapid map clicks) produce bursts of
//! coordinates. The scheduler keeps one slot per source and forwards only the
//! last coordinates of a burst, once the source has been quiet for the
//! configured period. Discrete actions use [`DebounceScheduler::immediate`].
//!
//! Each slot follows
//!
//! ```text
//! Idle -> Pending(timer) -> InFlight(request) -> Resolved | Failed
//!   ^          |                  |
//!   +----------+------------------+   (cancel or superseding update)
//! ```
//!
//! Every update bumps the slot's generation. Timers and results carry the
//! generation they were issued under, so a timer that already fired, or a
//! response that arrives late, cannot overwrite a newer state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TripDataError};
use crate::geocode::Place;
use crate::{DebounceConfig, GpsPoint};

/// Identifies an interaction source (one pending lookup per source).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lookup forwarded downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRequest {
    pub source: SourceId,
    pub coordinates: GpsPoint,
    pub generation: u64,
}

/// Lifecycle of a source's lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupState {
    Idle,
    Pending {
        coordinates: GpsPoint,
        generation: u64,
    },
    InFlight {
        coordinates: GpsPoint,
        generation: u64,
    },
    Resolved {
        place: Place,
        generation: u64,
    },
    Failed {
        error: TripDataError,
        generation: u64,
    },
}

#[derive(Default)]
struct Slot {
    generation: u64,
    state: Option<LookupState>,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    /// Invalidate everything issued so far and stop the pending timer.
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation
    }
}

struct Inner {
    quiet_period: Duration,
    slots: Mutex<HashMap<SourceId, Slot>>,
    downstream: mpsc::UnboundedSender<LookupRequest>,
    dispatched: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SourceId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer callback: forward the pending coordinates if still current.
    fn fire(&self, source: &SourceId, generation: u64) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(source) else {
            return;
        };
        if slot.generation != generation {
            debug!("[Debounce] Stale timer for {} (gen {})", source, generation);
            return;
        }
        slot.timer = None;

        if let Some(LookupState::Pending { coordinates, .. }) = slot.state {
            self.dispatch(slot, source, coordinates, generation);
        }
    }

    fn dispatch(&self, slot: &mut Slot, source: &SourceId, coordinates: GpsPoint, generation: u64) {
        let request = LookupRequest {
            source: source.clone(),
            coordinates,
            generation,
        };
        match self.downstream.send(request) {
            Ok(()) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                slot.state = Some(LookupState::InFlight {
                    coordinates,
                    generation,
                });
                debug!(
                    "[Debounce] Dispatched {} ({:.5}, {:.5}) gen {}",
                    source, coordinates.latitude, coordinates.longitude, generation
                );
            }
            Err(_) => {
                warn!("[Debounce] Lookup consumer is gone, dropping {}", source);
                slot.state = None;
            }
        }
    }
}

/// Coalesces coordinate updates per source before forwarding them.
///
/// Cloning shares the same slots and downstream channel. Scheduling spawns
/// timer tasks, so it must be called from within a tokio runtime.
#[derive(Clone)]
pub struct DebounceScheduler {
    inner: Arc<Inner>,
}

impl DebounceScheduler {
    /// Create a scheduler and the receiving end of its downstream channel.
    pub fn new(config: &DebounceConfig) -> (Self, mpsc::UnboundedReceiver<LookupRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(Inner {
                quiet_period: config.quiet_period(),
                slots: Mutex::new(HashMap::new()),
                downstream: tx,
                dispatched: AtomicU64::new(0),
            }),
        };
        (scheduler, rx)
    }

    pub fn quiet_period(&self) -> Duration {
        self.inner.quiet_period
    }

    /// Replace the source's pending lookup and restart its quiet period.
    ///
    /// Returns the generation the lookup will carry.
    pub fn schedule(&self, source: impl Into<SourceId>, coordinates: GpsPoint) -> u64 {
        let source: SourceId = source.into();
        let mut slots = self.inner.lock();
        let slot = slots.entry(source.clone()).or_default();

        let generation = slot.supersede();
        slot.state = Some(LookupState::Pending {
            coordinates,
            generation,
        });

        let inner = Arc::clone(&self.inner);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_period).await;
            inner.fire(&source, generation);
        }));

        generation
    }

    /// Forward coordinates now, superseding anything pending for the source.
    pub fn immediate(&self, source: impl Into<SourceId>, coordinates: GpsPoint) -> u64 {
        let source: SourceId = source.into();
        let mut slots = self.inner.lock();
        let slot = slots.entry(source.clone()).or_default();

        let generation = slot.supersede();
        self.inner.dispatch(slot, &source, coordinates, generation);
        generation
    }

    /// Return the source to idle. Any in-flight result becomes stale.
    pub fn cancel(&self, source: impl Into<SourceId>) {
        let source: SourceId = source.into();
        let mut slots = self.inner.lock();
        if let Some(slot) = slots.get_mut(&source) {
            slot.supersede();
            slot.state = None;
        }
    }

    /// Cancel every source.
    pub fn cancel_all(&self) {
        let mut slots = self.inner.lock();
        for slot in slots.values_mut() {
            slot.supersede();
            slot.state = None;
        }
    }

    /// Whether the request is still the latest for its source.
    pub fn is_current(&self, request: &LookupRequest) -> bool {
        self.inner
            .lock()
            .get(&request.source)
            .is_some_and(|slot| slot.generation == request.generation)
    }

    /// Record a lookup outcome. Returns false (and changes nothing) when the
    /// request has been superseded.
    pub fn complete(&self, request: &LookupRequest, result: &Result<Place>) -> bool {
        let mut slots = self.inner.lock();
        let Some(slot) = slots.get_mut(&request.source) else {
            return false;
        };
        if slot.generation != request.generation {
            debug!(
                "[Debounce] Discarding stale result for {} (gen {}, current {})",
                request.source, request.generation, slot.generation
            );
            return false;
        }

        slot.state = Some(match result {
            Ok(place) => LookupState::Resolved {
                place: place.clone(),
                generation: request.generation,
            },
            Err(error) => LookupState::Failed {
                error: error.clone(),
                generation: request.generation,
            },
        });
        true
    }

    /// Current lifecycle state of a source.
    pub fn state(&self, source: impl Into<SourceId>) -> LookupState {
        let source: SourceId = source.into();
        self.inner
            .lock()
            .get(&source)
            .and_then(|slot| slot.state.clone())
            .unwrap_or(LookupState::Idle)
    }

    /// Total lookups forwarded downstream.
    pub fn dispatched_count(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::time::sleep;

    fn scheduler() -> (DebounceScheduler, mpsc::UnboundedReceiver<LookupRequest>) {
        DebounceScheduler::new(&DebounceConfig::default())
    }

    fn place(name: &str) -> Place {
        Place {
            name: name.to_string(),
            display_name: name.to_string(),
            address: BTreeMap::new(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_single_lookup_with_last_coordinates() {
        let (scheduler, mut rx) = scheduler();

        for lat in [46.000, 46.001, 46.002, 46.003, 46.004] {
            scheduler.schedule("drag", GpsPoint::new(lat, 7.0));
            sleep(Duration::from_millis(40)).await;
        }
        sleep(Duration::from_millis(1500)).await;

        let request = rx.try_recv().unwrap();
        assert_eq!(request.coordinates, GpsPoint::new(46.004, 7.0));
        assert_eq!(request.generation, 5);
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.dispatched_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_quiet_period() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule("drag", GpsPoint::new(46.0, 7.0));

        sleep(Duration::from_millis(900)).await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            scheduler.state("drag"),
            LookupState::Pending { .. }
        ));

        sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            scheduler.state("drag"),
            LookupState::InFlight { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_bypasses_timer_and_supersedes_pending() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule("click", GpsPoint::new(1.0, 1.0));
        scheduler.immediate("click", GpsPoint::new(2.0, 2.0));

        let request = rx.try_recv().unwrap();
        assert_eq!(request.coordinates, GpsPoint::new(2.0, 2.0));

        sleep(Duration::from_millis(2000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_independent() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule("a", GpsPoint::new(1.0, 1.0));
        scheduler.schedule("b", GpsPoint::new(2.0, 2.0));
        sleep(Duration::from_millis(1100)).await;

        let mut sources = vec![
            rx.try_recv().unwrap().source,
            rx.try_recv().unwrap().source,
        ];
        sources.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(sources, vec![SourceId::from("a"), SourceId::from("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let (scheduler, mut rx) = scheduler();
        scheduler.immediate("drag", GpsPoint::new(1.0, 1.0));
        let first = rx.try_recv().unwrap();

        // A newer update arrives while the first lookup is in flight
        scheduler.schedule("drag", GpsPoint::new(1.5, 1.5));
        assert!(!scheduler.is_current(&first));
        assert!(!scheduler.complete(&first, &Ok(place("old"))));
        assert!(matches!(
            scheduler.state("drag"),
            LookupState::Pending { .. }
        ));

        sleep(Duration::from_millis(1100)).await;
        let second = rx.try_recv().unwrap();
        assert!(scheduler.complete(&second, &Ok(place("new"))));
        match scheduler.state("drag") {
            LookupState::Resolved { place, generation } => {
                assert_eq!(place.name, "new");
                assert_eq!(generation, second.generation);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_idle() {
        let (scheduler, mut rx) = scheduler();
        scheduler.schedule("drag", GpsPoint::new(1.0, 1.0));
        scheduler.cancel("drag");
        assert_eq!(scheduler.state("drag"), LookupState::Idle);

        sleep(Duration::from_millis(1500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_recorded() {
        let (scheduler, mut rx) = scheduler();
        scheduler.immediate("click", GpsPoint::new(1.0, 1.0));
        let request = rx.try_recv().unwrap();
        assert!(scheduler.complete(&request, &Err(TripDataError::Timeout { timeout_ms: 10_000 })));
        assert!(matches!(
            scheduler.state("click"),
            LookupState::Failed {
                error: TripDataError::Timeout { .. },
                ..
            }
        ));
    }
}
