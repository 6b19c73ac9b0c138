//! Map surface state: the current view and the single location marker.

use serde::Serialize;
use tracing::debug;

use crate::types::Coordinate;

pub const INITIAL_ZOOM: u8 = 2;
/// Zoom applied when a search result is shown
pub const SEARCH_ZOOM: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: Coordinate,
    pub zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    pub id: u64,
    pub position: Coordinate,
}

/// Owns the view and at most one marker.
#[derive(Debug, Clone)]
pub struct MapSurface {
    view: MapView,
    marker: Option<Marker>,
    next_marker_id: u64,
}

impl MapSurface {
    pub fn new() -> Self {
        Self {
            view: MapView {
                center: Coordinate::new(0.0, 0.0),
                zoom: INITIAL_ZOOM,
            },
            marker: None,
            next_marker_id: 1,
        }
    }

    pub fn view(&self) -> MapView {
        self.view
    }

    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Pan and zoom the map
    pub fn set_view(&mut self, center: Coordinate, zoom: u8) {
        self.view = MapView { center, zoom };
    }

    /// Remove the current marker, if any, then place a new one at `position`.
    pub fn set_marker(&mut self, position: Coordinate) -> Marker {
        if let Some(old) = self.marker.take() {
            debug!("Removing marker {}", old.id);
        }

        let marker = Marker {
            id: self.next_marker_id,
            position,
        };
        self.next_marker_id += 1;
        self.marker = Some(marker);
        debug!(
            "Placed marker {} at ({}, {})",
            marker.id, position.latitude, position.longitude
        );
        marker
    }
}

impl Default for MapSurface {
    fn default() -> Self {
        Self::new()
    }
}
