//! # Geo Engine
//!
//! Explicit owner of the state shared across a running application.
//!
//! ## Architecture
//!
//! One [`GeoEngine`] is created at startup and passed to whoever needs it.
//! It owns:
//! - The engine configuration
//! - The geocoding cache (one per process, shared by `Arc`)
//! - The reverse geocoder and its system-wide rate limiter
//!
//! Each open trip view gets an [`InteractionSession`]: a sync coordinator for
//! the loaded track, a debounce scheduler, and a lookup worker that feeds
//! scheduled coordinates through the geocoder and reports outcomes back.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::debounce::{DebounceScheduler, LookupRequest, LookupState, SourceId};
use crate::error::Result;
use crate::geocode::{
    CacheStats, GeocodeCache, GeocodeOutcome, GeocodeProvider, NamedLocation, ReverseGeocoder,
};
use crate::pipeline::{process_points, process_track, process_track_off_thread, ProcessedTrack};
use crate::sync::{SyncCoordinator, SyncEvent, ViewCommand};
use crate::{EngineConfig, GpsPoint, RawPoint};

/// Source name used for locations picked on the map.
pub const MAP_CLICK_SOURCE: &str = "map_click";

// ============================================================================
// Engine
// ============================================================================

/// Shared geospatial state: configuration, geocoding cache and geocoder.
pub struct GeoEngine {
    config: EngineConfig,
    cache: Arc<GeocodeCache>,
    geocoder: Arc<ReverseGeocoder>,
}

impl GeoEngine {
    /// Create an engine geocoding against the configured Nominatim server.
    #[cfg(feature = "http")]
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(GeocodeCache::new(config.geocode.cache_capacity)?);
        let geocoder = ReverseGeocoder::nominatim(Arc::clone(&cache), &config.geocode)?;
        Ok(Self::assemble(config, cache, geocoder))
    }

    /// Create an engine with a custom geocoding provider.
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn GeocodeProvider>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(GeocodeCache::new(config.geocode.cache_capacity)?);
        let geocoder = ReverseGeocoder::new(Arc::clone(&cache), provider, &config.geocode);
        Ok(Self::assemble(config, cache, geocoder))
    }

    fn assemble(config: EngineConfig, cache: Arc<GeocodeCache>, geocoder: ReverseGeocoder) -> Self {
        info!(
            "[GeoEngine] Created (cache capacity {}, quiet period {} ms)",
            cache.capacity(),
            config.debounce.quiet_period_ms
        );
        Self {
            config,
            cache,
            geocoder: Arc::new(geocoder),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn geocoder(&self) -> &Arc<ReverseGeocoder> {
        &self.geocoder
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ========================================================================
    // Track Processing
    // ========================================================================

    /// Process track bytes on the calling thread.
    pub fn process(&self, bytes: &[u8]) -> Result<ProcessedTrack> {
        process_track(bytes, &self.config.track)
    }

    /// Process track bytes on the blocking pool.
    pub async fn ingest(&self, bytes: Vec<u8>) -> Result<ProcessedTrack> {
        process_track_off_thread(bytes, self.config.track.clone()).await
    }

    /// Rebuild a track after its points were edited.
    pub fn recompute(&self, points: &[RawPoint]) -> Result<ProcessedTrack> {
        process_points(points, &self.config.track)
    }

    // ========================================================================
    // Geocoding
    // ========================================================================

    /// Resolve coordinates once, degrading failures to manual entry.
    pub async fn resolve(&self, coordinates: GpsPoint) -> GeocodeOutcome {
        self.geocoder.resolve_or_manual(coordinates).await
    }

    /// Start interaction on a processed track.
    ///
    /// Spawns the session's lookup worker, so it must be called from within a
    /// tokio runtime.
    pub fn start_session(&self, track: &ProcessedTrack) -> InteractionSession {
        let (scheduler, requests) = DebounceScheduler::new(&self.config.debounce);
        let (results_tx, results) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_lookups(
            requests,
            Arc::clone(&self.geocoder),
            scheduler.clone(),
            results_tx,
        ));

        let coordinator = SyncCoordinator::new(track.points.clone(), self.config.sync.clone())
            .with_scheduler(scheduler.clone());

        debug!(
            "[GeoEngine] Session started on {} points",
            track.points.len()
        );

        InteractionSession {
            coordinator,
            scheduler,
            results,
            worker,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Outcome of a scheduled lookup that was still current when it finished.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub source: SourceId,
    pub generation: u64,
    pub coordinates: GpsPoint,
    pub outcome: GeocodeOutcome,
}

impl LookupResult {
    /// The location to persist: the resolved place, or the user's own name
    /// for it when the lookup failed.
    pub fn named_location(&self, manual_name: Option<&str>) -> Option<NamedLocation> {
        match &self.outcome {
            GeocodeOutcome::Resolved(place) => Some(NamedLocation::resolved(place)),
            GeocodeOutcome::ManualEntry { coordinates, .. } => manual_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| NamedLocation::manual(*coordinates, name)),
        }
    }
}

/// Interaction wiring for one displayed track.
pub struct InteractionSession {
    coordinator: SyncCoordinator,
    scheduler: DebounceScheduler,
    results: mpsc::UnboundedReceiver<LookupResult>,
    worker: JoinHandle<()>,
}

impl InteractionSession {
    /// Feed an interaction event to the coordinator.
    pub fn handle(&mut self, event: SyncEvent) -> Result<Vec<ViewCommand>> {
        self.coordinator.handle(event)
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn set_edit_mode(&mut self, enabled: bool) {
        self.coordinator.set_edit_mode(enabled);
    }

    /// A location picked on the map, resolved once clicking settles.
    pub fn pick_location(&self, coordinates: GpsPoint) -> Result<u64> {
        coordinates.validate()?;
        Ok(self.scheduler.schedule(MAP_CLICK_SOURCE, coordinates))
    }

    /// A location picked on the map, resolved without waiting.
    pub fn pick_location_now(&self, coordinates: GpsPoint) -> Result<u64> {
        coordinates.validate()?;
        Ok(self.scheduler.immediate(MAP_CLICK_SOURCE, coordinates))
    }

    pub fn lookup_state(&self, source: impl Into<SourceId>) -> LookupState {
        self.scheduler.state(source)
    }

    /// Wait for the next current lookup outcome.
    pub async fn next_result(&mut self) -> Option<LookupResult> {
        self.results.recv().await
    }

    pub fn try_next_result(&mut self) -> Option<LookupResult> {
        self.results.try_recv().ok()
    }

    /// Show a different track. Pending lookups are dropped.
    pub fn replace_track(&mut self, track: &ProcessedTrack) {
        self.scheduler.cancel_all();
        self.coordinator.reset(track.points.clone());
    }
}

impl Drop for InteractionSession {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
        self.worker.abort();
    }
}

/// Resolve scheduled lookups as they arrive, reporting current outcomes.
async fn run_lookups(
    requests: mpsc::UnboundedReceiver<LookupRequest>,
    geocoder: Arc<ReverseGeocoder>,
    scheduler: DebounceScheduler,
    results: mpsc::UnboundedSender<LookupResult>,
) {
    let requests = stream::unfold(requests, |mut rx| async move {
        rx.recv().await.map(|request| (request, rx))
    });

    requests
        .for_each_concurrent(None, |request| {
            let geocoder = &geocoder;
            let scheduler = &scheduler;
            let results = &results;
            async move {
                let resolved = geocoder
                    .resolve_while(request.coordinates, || scheduler.is_current(&request))
                    .await;
                let Some(result) = resolved else {
                    debug!("[GeoEngine] Skipped superseded lookup for {}", request.source);
                    return;
                };
                if !scheduler.complete(&request, &result) {
                    return;
                }

                let report = LookupResult {
                    outcome: GeocodeOutcome::from_result(request.coordinates, result),
                    source: request.source,
                    generation: request.generation,
                    coordinates: request.coordinates,
                };
                if results.send(report).is_err() {
                    debug!("[GeoEngine] Session closed, dropping lookup result");
                }
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripDataError;
    use crate::geocode::Place;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NamedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodeProvider for NamedProvider {
        async fn reverse(&self, coordinates: GpsPoint) -> Result<Place> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Place {
                name: format!("{:.2},{:.2}", coordinates.latitude, coordinates.longitude),
                display_name: "somewhere".to_string(),
                address: BTreeMap::new(),
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            })
        }
    }

    fn engine() -> (GeoEngine, Arc<NamedProvider>) {
        let provider = Arc::new(NamedProvider {
            calls: AtomicUsize::new(0),
        });
        let engine = GeoEngine::with_provider(EngineConfig::default(), provider.clone()).unwrap();
        (engine, provider)
    }

    fn track(engine: &GeoEngine) -> ProcessedTrack {
        let json = br#"[
            {"lat": 46.30, "lon": 7.10, "ele": 500},
            {"lat": 46.31, "lon": 7.12, "ele": 650},
            {"lat": 46.33, "lon": 7.13, "ele": 600}
        ]"#;
        engine.process(json).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.geocode.cache_capacity = 0;
        let provider = Arc::new(NamedProvider {
            calls: AtomicUsize::new(0),
        });
        assert!(matches!(
            GeoEngine::with_provider(config, provider),
            Err(TripDataError::Config { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_picked_location_is_resolved() {
        let (engine, provider) = engine();
        let track = track(&engine);
        let mut session = engine.start_session(&track);

        session.pick_location_now(GpsPoint::new(46.5, 7.2)).unwrap();
        let result = session.next_result().await.unwrap();

        assert_eq!(result.source, SourceId::from(MAP_CLICK_SOURCE));
        assert_eq!(result.outcome.place().map(|p| p.name.as_str()), Some("46.50,7.20"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            session.lookup_state(MAP_CLICK_SOURCE),
            LookupState::Resolved { .. }
        ));

        let location = result.named_location(None).unwrap();
        assert_eq!(location.place_name, "46.50,7.20");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_picks_resolve_last_only() {
        let (engine, provider) = engine();
        let track = track(&engine);
        let mut session = engine.start_session(&track);

        for lat in [46.0, 46.1, 46.2, 46.3] {
            session.pick_location(GpsPoint::new(lat, 7.0)).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let result = session.next_result().await.unwrap();
        assert_eq!(result.coordinates, GpsPoint::new(46.3, 7.0));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_drives_sync_and_drag_lookup() {
        let (engine, _provider) = engine();
        let track = track(&engine);
        let mut session = engine.start_session(&track);

        let commands = session.handle(SyncEvent::ProfileClick { index: 0 }).unwrap();
        assert!(matches!(commands[0], ViewCommand::CenterMap { .. }));

        session.set_edit_mode(true);
        session
            .handle(SyncEvent::MarkerDrag {
                coordinates: GpsPoint::new(46.4, 7.3),
            })
            .unwrap();
        let result = session.next_result().await.unwrap();
        assert_eq!(result.source.as_str(), crate::sync::MARKER_DRAG_SOURCE);
        assert_eq!(result.coordinates, GpsPoint::new(46.4, 7.3));
    }

    #[test]
    fn test_manual_name_required_after_failure() {
        let coordinates = GpsPoint::new(46.0, 7.0);
        let result = LookupResult {
            source: SourceId::from(MAP_CLICK_SOURCE),
            generation: 1,
            coordinates,
            outcome: GeocodeOutcome::from_result(
                coordinates,
                Err(TripDataError::Timeout { timeout_ms: 10_000 }),
            ),
        };
        assert!(result.named_location(None).is_none());
        assert!(result.named_location(Some("   ")).is_none());
        let location = result.named_location(Some(" Col du Pillon ")).unwrap();
        assert_eq!(location.place_name, "Col du Pillon");
        assert_eq!(location.origin, crate::geocode::PlaceOrigin::Manual);
    }

    #[tokio::test]
    async fn test_ingest_off_thread() {
        let (engine, _provider) = engine();
        let bytes = br#"{"points": [{"lat": 1.0, "lon": 1.0}, {"lat": 1.0, "lon": 1.01}]}"#.to_vec();
        let track = engine.ingest(bytes).await.unwrap();
        assert_eq!(track.points.len(), 2);
        assert!(!track.statistics.has_elevation);
        assert_eq!(engine.cache_stats().size, 0);
    }
}
