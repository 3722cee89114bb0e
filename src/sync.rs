//! # Map / Elevation Profile Synchronization
//!
//! The map view and the elevation chart show the same track. Interaction on
//! either side arrives here as a [`SyncEvent`]; the coordinator answers with
//! [`ViewCommand`]s for the map, synchronously and without queuing, so a
//! click on the profile re-centers the map in the same call.
//!
//! Hovering moves the highlight between retained points only. There is no
//! interpolation between them, so on a simplified track the marker jumps.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::debounce::{DebounceScheduler, SourceId};
use crate::error::Result;
use crate::{GpsPoint, SyncConfig, TrackPoint};

/// Source name used for marker drag lookups.
pub const MARKER_DRAG_SOURCE: &str = "marker_drag";

/// User interaction on the map or the profile chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Pointer over the profile at a retained point
    ProfileHover { index: usize },
    /// Click on the profile at a retained point
    ProfileClick { index: usize },
    /// Pointer left the profile
    ProfileLeave,
    /// The location marker was dragged (edit mode)
    MarkerDrag { coordinates: GpsPoint },
    /// The map finished its re-centering animation
    TransitionFinished,
}

/// Instruction for the map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewCommand {
    CenterMap {
        latitude: f64,
        longitude: f64,
        zoom: f64,
        duration: Duration,
    },
    HighlightMarker {
        latitude: f64,
        longitude: f64,
    },
    ClearHighlight,
}

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    PointActive {
        index: usize,
    },
    Transitioning {
        index: usize,
    },
}

/// Shared interaction state for one track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Last point selected on the profile
    pub active_index: Option<usize>,
    /// Coordinates of the active point, or of the dragged marker
    pub active_coordinates: Option<GpsPoint>,
    /// Point currently highlighted by hover
    pub highlighted_index: Option<usize>,
    /// Where the map was last asked to center
    pub viewport_target: Option<GpsPoint>,
    pub edit_mode: bool,
    pub phase: SyncPhase,
}

/// Translates profile and map interaction into view commands.
pub struct SyncCoordinator {
    points: Vec<TrackPoint>,
    config: SyncConfig,
    state: SyncState,
    scheduler: Option<DebounceScheduler>,
    drag_source: SourceId,
}

impl SyncCoordinator {
    pub fn new(points: Vec<TrackPoint>, config: SyncConfig) -> Self {
        Self {
            points,
            config,
            state: SyncState::default(),
            scheduler: None,
            drag_source: SourceId::from(MARKER_DRAG_SOURCE),
        }
    }

    /// Forward marker drags to a debounce scheduler.
    pub fn with_scheduler(mut self, scheduler: DebounceScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.phase
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn set_edit_mode(&mut self, enabled: bool) {
        self.state.edit_mode = enabled;
    }

    /// Swap in a new track and forget all interaction state.
    pub fn reset(&mut self, points: Vec<TrackPoint>) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel(self.drag_source.clone());
        }
        self.points = points;
        self.state = SyncState::default();
        debug!("[SyncCoordinator] Reset with {} points", self.points.len());
    }

    /// Handle one interaction event.
    ///
    /// Only a drag to invalid coordinates is an error. Events referring to
    /// points that do not exist produce no commands.
    pub fn handle(&mut self, event: SyncEvent) -> Result<Vec<ViewCommand>> {
        match event {
            SyncEvent::ProfileHover { index } => Ok(self.hover(index)),
            SyncEvent::ProfileClick { index } => Ok(self.click(index)),
            SyncEvent::ProfileLeave => {
                if self.state.highlighted_index.take().is_some() {
                    Ok(vec![ViewCommand::ClearHighlight])
                } else {
                    Ok(Vec::new())
                }
            }
            SyncEvent::MarkerDrag { coordinates } => self.drag(coordinates),
            SyncEvent::TransitionFinished => {
                if let SyncPhase::Transitioning { index } = self.state.phase {
                    self.state.phase = SyncPhase::PointActive { index };
                }
                Ok(Vec::new())
            }
        }
    }

    /// Hover over the profile at a distance from the start.
    pub fn hover_at_distance(&mut self, distance_km: f64) -> Vec<ViewCommand> {
        match self.index_at_distance(distance_km) {
            Some(index) => self.hover(index),
            None => Vec::new(),
        }
    }

    /// Index of the retained point closest to a distance along the track.
    pub fn index_at_distance(&self, distance_km: f64) -> Option<usize> {
        if self.points.is_empty() || !distance_km.is_finite() {
            return None;
        }
        let after = self
            .points
            .partition_point(|p| p.cumulative_distance_km < distance_km);
        if after == 0 {
            return Some(0);
        }
        if after == self.points.len() {
            return Some(self.points.len() - 1);
        }
        let before = after - 1;
        let to_before = distance_km - self.points[before].cumulative_distance_km;
        let to_after = self.points[after].cumulative_distance_km - distance_km;
        Some(if to_after < to_before { after } else { before })
    }

    fn hover(&mut self, index: usize) -> Vec<ViewCommand> {
        let Some(point) = self.points.get(index) else {
            debug!("[SyncCoordinator] Hover index {} out of range", index);
            return Vec::new();
        };
        if self.state.highlighted_index == Some(index) {
            return Vec::new();
        }
        self.state.highlighted_index = Some(index);
        vec![ViewCommand::HighlightMarker {
            latitude: point.latitude,
            longitude: point.longitude,
        }]
    }

    fn click(&mut self, index: usize) -> Vec<ViewCommand> {
        let Some(point) = self.points.get(index) else {
            debug!("[SyncCoordinator] Click index {} out of range", index);
            return Vec::new();
        };
        let coordinates = point.coordinates();

        self.state.active_index = Some(index);
        self.state.active_coordinates = Some(coordinates);
        self.state.viewport_target = Some(coordinates);
        self.state.phase = SyncPhase::Transitioning { index };

        vec![ViewCommand::CenterMap {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            zoom: self.config.click_zoom,
            duration: self.config.animation_duration(),
        }]
    }

    fn drag(&mut self, coordinates: GpsPoint) -> Result<Vec<ViewCommand>> {
        if !self.state.edit_mode {
            debug!("[SyncCoordinator] Ignoring marker drag outside edit mode");
            return Ok(Vec::new());
        }
        coordinates.validate()?;

        self.state.active_coordinates = Some(coordinates);
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule(self.drag_source.clone(), coordinates);
        }
        Ok(Vec::new())
    }
}
