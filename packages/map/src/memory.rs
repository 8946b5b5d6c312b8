//! In-memory implementations of the renderer and scheduler ports.
//!
//! [`InMemoryRenderer`] keeps markers, clusters, circles and listeners in
//! plain collections and groups clustered markers greedily by screen
//! distance at the current zoom (Web-Mercator pixels, R-tree lookups).
//! [`ManualScheduler`] is a virtual clock: nothing fires until the caller
//! advances it. Together they drive the engine deterministically from the
//! CLI and from tests.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use geo::Point;
use incident_map_map_models::{
    CircleSpec, ClusterId, ClusterSnapshot, FrameHandle, ListenerId, MapEvent, MapEventKind,
    MarkerId, MarkerPreset, MarkerSpec, ShapeId, TimerHandle, Viewport,
};
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::ports::{FrameScheduler, MapRenderer, RenderError, Wakeup};

/// Web-Mercator tile size in pixels.
const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the Web-Mercator projection.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Projects a point to world pixel coordinates at `zoom`.
#[must_use]
pub fn project(position: Point<f64>, zoom: u8) -> [f64; 2] {
    let scale = TILE_SIZE * f64::from(1_u32 << zoom.min(24));
    let x = (position.x().clamp(-180.0, 180.0) + 180.0) / 360.0 * scale;
    let lat = position
        .y()
        .clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT)
        .to_radians();
    let y = (1.0 - lat.tan().asinh() / std::f64::consts::PI) / 2.0 * scale;
    [x, y]
}

#[derive(Debug, Clone)]
struct RenderedCluster {
    id: ClusterId,
    members: Vec<MarkerId>,
    preset: Option<MarkerPreset>,
}

/// A renderer that draws nothing and remembers everything.
#[derive(Debug, Clone)]
pub struct InMemoryRenderer {
    canvas: Option<Viewport>,
    unavailable: Option<String>,
    broken: bool,
    next_id: u64,
    cluster_radius_px: f64,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    /// `None` while membership needs recomputing.
    clusters: Option<Vec<RenderedCluster>>,
    circles: BTreeMap<ShapeId, CircleSpec>,
    listeners: BTreeMap<ListenerId, MapEventKind>,
    listener_limit: Option<usize>,
    orphaned_listeners: usize,
    open_callout: Option<MarkerId>,
    flights: Vec<(Point<f64>, Duration)>,
    canvases_created: usize,
}

impl InMemoryRenderer {
    /// Creates a renderer grouping markers closer than `cluster_radius_px`.
    #[must_use]
    pub const fn new(cluster_radius_px: f64) -> Self {
        Self {
            canvas: None,
            unavailable: None,
            broken: false,
            next_id: 1,
            cluster_radius_px,
            markers: BTreeMap::new(),
            clusters: None,
            circles: BTreeMap::new(),
            listeners: BTreeMap::new(),
            listener_limit: None,
            orphaned_listeners: 0,
            open_callout: None,
            flights: Vec::new(),
            canvases_created: 0,
        }
    }

    /// Creates a renderer whose canvas can never be created.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        let mut renderer = Self::new(0.0);
        renderer.unavailable = Some(message.into());
        renderer
    }

    /// Simulates the canvas being destroyed behind the engine's back:
    /// every further call fails until [`MapRenderer::destroy_canvas`].
    pub fn break_canvas(&mut self) {
        self.broken = true;
    }

    /// Makes [`MapRenderer::subscribe`] fail once `max` listeners are
    /// registered.
    pub const fn limit_listeners(&mut self, max: usize) {
        self.listener_limit = Some(max);
    }

    /// Changes the zoom level and returns the event a real map would emit.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CanvasDestroyed`] if there is no live canvas.
    pub fn zoom_to(&mut self, zoom: u8) -> Result<MapEvent, RenderError> {
        self.live()?;
        let viewport = self.canvas.as_mut().ok_or(RenderError::CanvasDestroyed)?;
        viewport.zoom = zoom;
        let viewport = *viewport;
        self.clusters = None;
        Ok(MapEvent::ViewportChanged(viewport))
    }

    /// Passes `event` through if some listener is registered for it.
    #[must_use]
    pub fn deliver(&self, event: MapEvent) -> Option<MapEvent> {
        let kind = event.kind();
        self.listeners
            .values()
            .any(|listener| *listener == kind)
            .then_some(event)
    }

    /// Current viewport, if a canvas exists.
    #[must_use]
    pub const fn viewport(&self) -> Option<Viewport> {
        self.canvas
    }

    /// Number of canvases created over the renderer's lifetime.
    #[must_use]
    pub const fn canvases_created(&self) -> usize {
        self.canvases_created
    }

    /// All markers, ordered by id.
    pub fn markers(&self) -> impl Iterator<Item = (MarkerId, &MarkerSpec)> {
        self.markers.iter().map(|(id, spec)| (*id, spec))
    }

    /// One marker.
    #[must_use]
    pub fn marker(&self, marker: MarkerId) -> Option<&MarkerSpec> {
        self.markers.get(&marker)
    }

    /// All circles currently drawn.
    pub fn circles(&self) -> impl Iterator<Item = (ShapeId, &CircleSpec)> {
        self.circles.iter().map(|(id, spec)| (*id, spec))
    }

    /// The marker whose callout is open.
    #[must_use]
    pub const fn open_callout(&self) -> Option<MarkerId> {
        self.open_callout
    }

    /// Every `fly_to` received, oldest first.
    #[must_use]
    pub fn flights(&self) -> &[(Point<f64>, Duration)] {
        &self.flights
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners that were still registered when their canvas was
    /// destroyed, over the renderer's lifetime.
    #[must_use]
    pub const fn orphaned_listeners(&self) -> usize {
        self.orphaned_listeners
    }

    /// Preset last assigned to a cluster.
    #[must_use]
    pub fn cluster_preset(&self, cluster: ClusterId) -> Option<MarkerPreset> {
        self.clusters
            .as_ref()?
            .iter()
            .find(|c| c.id == cluster)
            .and_then(|c| c.preset)
    }

    const fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn live(&self) -> Result<Viewport, RenderError> {
        if self.broken {
            return Err(RenderError::CanvasDestroyed);
        }
        self.canvas.ok_or(RenderError::CanvasDestroyed)
    }

    fn ensure_clusters(&mut self) -> Result<&mut Vec<RenderedCluster>, RenderError> {
        let viewport = self.live()?;
        if self.clusters.is_none() {
            let clusters = self.compute_clusters(viewport.zoom);
            log::trace!(
                "Grouped {} markers into {} clusters at zoom {}",
                self.markers.len(),
                clusters.len(),
                viewport.zoom
            );
            self.clusters = Some(clusters);
        }
        Ok(self.clusters.get_or_insert_with(Vec::new))
    }

    fn compute_clusters(&mut self, zoom: u8) -> Vec<RenderedCluster> {
        let points: Vec<GeomWithData<[f64; 2], MarkerId>> = self
            .markers
            .iter()
            .filter(|(_, spec)| spec.clustered)
            .map(|(id, spec)| GeomWithData::new(project(spec.position, zoom), *id))
            .collect();
        let tree = RTree::bulk_load(points.clone());
        let max_distance_2 = self.cluster_radius_px * self.cluster_radius_px;

        let mut assigned: BTreeSet<MarkerId> = BTreeSet::new();
        let mut groups: Vec<Vec<MarkerId>> = Vec::new();

        for point in &points {
            if assigned.contains(&point.data) {
                continue;
            }
            let mut members: Vec<MarkerId> = tree
                .locate_within_distance(*point.geom(), max_distance_2)
                .map(|neighbor| neighbor.data)
                .filter(|id| !assigned.contains(id))
                .collect();
            members.sort_unstable();

            assigned.extend(members.iter().copied());
            if members.len() >= 2 {
                groups.push(members);
            }
        }

        groups
            .into_iter()
            .map(|members| RenderedCluster {
                id: ClusterId(self.next_id()),
                members,
                preset: None,
            })
            .collect()
    }
}

impl MapRenderer for InMemoryRenderer {
    fn create_canvas(&mut self, viewport: Viewport) -> Result<(), RenderError> {
        if let Some(message) = &self.unavailable {
            return Err(RenderError::CanvasUnavailable {
                message: message.clone(),
            });
        }
        if self.canvas.is_some() {
            return Err(RenderError::Backend {
                message: "a canvas already exists for this renderer".to_string(),
            });
        }
        self.canvas = Some(viewport);
        self.broken = false;
        self.canvases_created += 1;
        Ok(())
    }

    fn destroy_canvas(&mut self) -> Result<(), RenderError> {
        if self.canvas.take().is_none() {
            return Err(RenderError::CanvasDestroyed);
        }
        self.broken = false;
        self.markers.clear();
        self.clusters = None;
        self.circles.clear();
        self.orphaned_listeners += self.listeners.len();
        self.listeners.clear();
        self.open_callout = None;
        Ok(())
    }

    fn subscribe(&mut self, kind: MapEventKind) -> Result<ListenerId, RenderError> {
        self.live()?;
        if self
            .listener_limit
            .is_some_and(|max| self.listeners.len() >= max)
        {
            return Err(RenderError::Backend {
                message: format!("listener limit of {} reached", self.listeners.len()),
            });
        }
        let id = ListenerId(self.next_id());
        self.listeners.insert(id, kind);
        Ok(id)
    }

    fn unsubscribe(&mut self, listener: ListenerId) -> Result<(), RenderError> {
        self.live()?;
        self.listeners
            .remove(&listener)
            .map(|_| ())
            .ok_or(RenderError::UnknownHandle {
                kind: "listener",
                id: listener.0,
            })
    }

    fn add_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerId, RenderError> {
        self.live()?;
        let id = MarkerId(self.next_id());
        self.markers.insert(id, spec.clone());
        if spec.clustered {
            self.clusters = None;
        }
        Ok(id)
    }

    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), RenderError> {
        self.live()?;
        let spec = self
            .markers
            .remove(&marker)
            .ok_or(RenderError::UnknownHandle {
                kind: "marker",
                id: marker.0,
            })?;
        if spec.clustered {
            self.clusters = None;
        }
        if self.open_callout == Some(marker) {
            self.open_callout = None;
        }
        Ok(())
    }

    fn clear_markers(&mut self) -> Result<(), RenderError> {
        self.live()?;
        self.markers.retain(|_, spec| !spec.clustered);
        if self
            .open_callout
            .is_some_and(|marker| !self.markers.contains_key(&marker))
        {
            self.open_callout = None;
        }
        self.clusters = None;
        Ok(())
    }

    fn clusters(&mut self) -> Result<Vec<ClusterSnapshot>, RenderError> {
        Ok(self
            .ensure_clusters()?
            .iter()
            .map(|cluster| ClusterSnapshot {
                id: cluster.id,
                members: cluster.members.clone(),
            })
            .collect())
    }

    fn cluster_members(&mut self, cluster: ClusterId) -> Result<Vec<MarkerId>, RenderError> {
        self.ensure_clusters()?
            .iter()
            .find(|c| c.id == cluster)
            .map(|c| c.members.clone())
            .ok_or(RenderError::UnknownHandle {
                kind: "cluster",
                id: cluster.0,
            })
    }

    fn set_cluster_preset(
        &mut self,
        cluster: ClusterId,
        preset: MarkerPreset,
    ) -> Result<(), RenderError> {
        let rendered = self
            .ensure_clusters()?
            .iter_mut()
            .find(|c| c.id == cluster)
            .ok_or(RenderError::UnknownHandle {
                kind: "cluster",
                id: cluster.0,
            })?;
        rendered.preset = Some(preset);
        Ok(())
    }

    fn add_circle(&mut self, circle: &CircleSpec) -> Result<ShapeId, RenderError> {
        self.live()?;
        let id = ShapeId(self.next_id());
        self.circles.insert(id, *circle);
        Ok(id)
    }

    fn update_circle(&mut self, shape: ShapeId, circle: &CircleSpec) -> Result<(), RenderError> {
        self.live()?;
        let existing = self
            .circles
            .get_mut(&shape)
            .ok_or(RenderError::UnknownHandle {
                kind: "circle",
                id: shape.0,
            })?;
        *existing = *circle;
        Ok(())
    }

    fn remove_circle(&mut self, shape: ShapeId) -> Result<(), RenderError> {
        self.live()?;
        self.circles
            .remove(&shape)
            .map(|_| ())
            .ok_or(RenderError::UnknownHandle {
                kind: "circle",
                id: shape.0,
            })
    }

    fn fly_to(&mut self, center: Point<f64>, duration: Duration) -> Result<(), RenderError> {
        self.live()?;
        if let Some(viewport) = self.canvas.as_mut() {
            viewport.center = center;
        }
        self.flights.push((center, duration));
        Ok(())
    }

    fn open_callout(&mut self, marker: MarkerId) -> Result<(), RenderError> {
        self.live()?;
        if !self.markers.contains_key(&marker) {
            return Err(RenderError::UnknownHandle {
                kind: "marker",
                id: marker.0,
            });
        }
        self.open_callout = Some(marker);
        Ok(())
    }

    fn close_callout(&mut self, marker: MarkerId) -> Result<(), RenderError> {
        self.live()?;
        if self.open_callout == Some(marker) {
            self.open_callout = None;
        }
        Ok(())
    }
}

/// A scheduler driven by an explicit virtual clock.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    frames: BTreeSet<FrameHandle>,
    timers: BTreeMap<TimerHandle, Duration>,
}

impl ManualScheduler {
    /// Creates a scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by` and returns what became due:
    /// expired timers (earliest first), then every pending frame request
    /// stamped with the new time.
    pub fn advance(&mut self, by: Duration) -> Vec<Wakeup> {
        self.now += by;

        let mut due: Vec<(Duration, TimerHandle)> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= self.now)
            .map(|(handle, at)| (*at, *handle))
            .collect();
        due.sort_unstable();
        for (_, handle) in &due {
            self.timers.remove(handle);
        }

        let timestamp = self.now;
        due.into_iter()
            .map(|(_, handle)| Wakeup::Timer(handle))
            .chain(
                std::mem::take(&mut self.frames)
                    .into_iter()
                    .map(|handle| Wakeup::Frame { handle, timestamp }),
            )
            .collect()
    }

    /// Pending frame requests.
    #[must_use]
    pub fn pending_frames(&self) -> Vec<FrameHandle> {
        self.frames.iter().copied().collect()
    }

    /// Pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> Vec<TimerHandle> {
        self.timers.keys().copied().collect()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty() && self.timers.is_empty()
    }

    const fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl FrameScheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.now
    }

    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_id());
        self.frames.insert(handle);
        handle
    }

    fn cancel_frame(&mut self, frame: FrameHandle) {
        self.frames.remove(&frame);
    }

    fn set_timer(&mut self, delay: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_id());
        self.timers.insert(handle, self.now + delay);
        handle
    }

    fn clear_timer(&mut self, timer: TimerHandle) {
        self.timers.remove(&timer);
    }
}
