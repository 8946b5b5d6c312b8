//! One mounted map: canvas, listeners, marker table, location index and
//! the highlight animator.
//!
//! A [`MapSession`] is created by [`MapSession::open`] and must be closed
//! with [`MapSession::teardown`] before another canvas is created for the
//! same renderer. The renderer and scheduler are passed to each call; the
//! session only holds what it created on them.

use std::collections::BTreeMap;

use incident_map_incident_models::{Incident, IncidentId};
use incident_map_map_models::{
    BucketKey, HighlightState, ListenerId, MapConfig, MapEvent, MapEventKind, MarkerId,
    MarkerPayload, MarkerPreset, MarkerSpec,
};

use crate::MapError;
use crate::drill_down::{Interaction, aggregate};
use crate::highlight::{FocusOutcome, FocusTarget, HighlightAnimator};
use crate::index::LocationIndex;
use crate::normalize::address_key;
use crate::ports::{FrameScheduler, MapRenderer, RenderError, Wakeup};
use crate::style::{callout_lines, resolve_cluster_preset, resolve_marker_style};

/// Event families every session listens to.
pub const SUBSCRIBED_EVENTS: [MapEventKind; 4] = [
    MapEventKind::ClustersAdded,
    MapEventKind::ViewportChanged,
    MapEventKind::MarkerClick,
    MapEventKind::ClusterClick,
];

/// A marker placed for one location bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedMarker {
    /// Renderer id.
    pub marker: MarkerId,
    /// Preset it was drawn with.
    pub preset: MarkerPreset,
}

#[derive(Debug, Default)]
struct MarkerTable {
    by_key: BTreeMap<BucketKey, PlacedMarker>,
    by_marker: BTreeMap<MarkerId, BucketKey>,
}

impl MarkerTable {
    fn insert(&mut self, key: BucketKey, placed: PlacedMarker) {
        self.by_key.insert(key, placed);
        self.by_marker.insert(placed.marker, key);
    }
}

/// State owned by one mounted map canvas.
#[derive(Debug)]
pub struct MapSession {
    config: MapConfig,
    index: LocationIndex,
    markers: MarkerTable,
    listeners: Vec<ListenerId>,
    animator: HighlightAnimator,
    open: bool,
}

impl MapSession {
    /// Creates the canvas from the configured viewport and subscribes to
    /// every [`SUBSCRIBED_EVENTS`] family.
    ///
    /// # Errors
    ///
    /// * If the canvas cannot be created
    /// * If subscribing fails; the listeners registered so far are removed
    ///   and the canvas is destroyed again
    pub fn open<R>(renderer: &mut R, config: MapConfig) -> Result<Self, MapError>
    where
        R: MapRenderer + ?Sized,
    {
        let viewport = config.viewport.viewport();
        renderer.create_canvas(viewport)?;

        let mut listeners = Vec::with_capacity(SUBSCRIBED_EVENTS.len());
        for kind in SUBSCRIBED_EVENTS {
            match renderer.subscribe(kind) {
                Ok(listener) => listeners.push(listener),
                Err(e) => {
                    log::error!("Failed to subscribe to {kind} events: {e}");
                    for listener in listeners.drain(..) {
                        if let Err(unsubscribe) = renderer.unsubscribe(listener) {
                            log::warn!("Failed to unregister {listener}: {unsubscribe}");
                        }
                    }
                    if let Err(destroy) = renderer.destroy_canvas() {
                        log::warn!("Failed to destroy half-opened canvas: {destroy}");
                    }
                    return Err(e.into());
                }
            }
        }

        log::info!(
            "Mounted map canvas at {:.6},{:.6} zoom {} ({}x{})",
            viewport.center.y(),
            viewport.center.x(),
            viewport.zoom,
            viewport.width_px,
            viewport.height_px
        );

        let animator = HighlightAnimator::new(config.highlight.clone());
        Ok(Self {
            config,
            index: LocationIndex::default(),
            markers: MarkerTable::default(),
            listeners,
            animator,
            open: true,
        })
    }

    /// Whether [`Self::teardown`] has not run yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// The configuration the session was opened with.
    #[must_use]
    pub const fn config(&self) -> &MapConfig {
        &self.config
    }

    /// The current location index.
    #[must_use]
    pub const fn index(&self) -> &LocationIndex {
        &self.index
    }

    /// Marker placed for a location.
    #[must_use]
    pub fn marker_for(&self, key: &BucketKey) -> Option<PlacedMarker> {
        self.markers.by_key.get(key).copied()
    }

    /// Location a marker stands for.
    #[must_use]
    pub fn key_for_marker(&self, marker: MarkerId) -> Option<BucketKey> {
        self.markers.by_marker.get(&marker).copied()
    }

    /// Number of location markers.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers.by_key.len()
    }

    /// Listeners registered by this session.
    #[must_use]
    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }

    /// Phase of the highlight animation.
    #[must_use]
    pub fn highlight_state(&self) -> HighlightState {
        self.animator.state()
    }

    /// The highlight animator.
    #[must_use]
    pub const fn animator(&self) -> &HighlightAnimator {
        &self.animator
    }

    /// Looks up an incident placed on the map.
    #[must_use]
    pub fn incident(&self, id: IncidentId) -> Option<&Incident> {
        self.index.incident(id)
    }

    /// Replaces the incident set: cancels any highlight, rebuilds the
    /// index, replaces every location marker and recolors the clusters.
    ///
    /// The previous index and marker table stay in place until the new
    /// markers are all placed. If placing fails the session is left empty.
    ///
    /// # Errors
    ///
    /// * If the renderer fails while clearing or placing markers
    pub fn set_incidents<R, S>(
        &mut self,
        renderer: &mut R,
        scheduler: &mut S,
        incidents: &[Incident],
    ) -> Result<(), MapError>
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        self.animator.cancel(renderer, scheduler);

        let index = LocationIndex::build(incidents);
        let markers = match self.place_markers(renderer, &index) {
            Ok(markers) => markers,
            Err(e) => {
                log::error!("Failed to place markers: {e}");
                self.index = LocationIndex::default();
                self.markers = MarkerTable::default();
                if let Err(clear) = renderer.clear_markers() {
                    log::debug!("Failed to clear partially placed markers: {clear}");
                }
                return Err(e.into());
            }
        };

        self.index = index;
        self.markers = markers;
        log::debug!(
            "Placed {} markers for {} incidents",
            self.markers.by_key.len(),
            incidents.len()
        );

        self.refresh_cluster_colors(renderer)?;
        Ok(())
    }

    fn place_markers<R>(
        &self,
        renderer: &mut R,
        index: &LocationIndex,
    ) -> Result<MarkerTable, RenderError>
    where
        R: MapRenderer + ?Sized,
    {
        renderer.clear_markers()?;

        let mut table = MarkerTable::default();
        for bucket in index.buckets() {
            let style = resolve_marker_style(bucket, self.config.style_policy);
            let marker = renderer.add_marker(&MarkerSpec {
                position: bucket.key().point(),
                preset: style.preset,
                tooltip: style.tooltip,
                callout: callout_lines(bucket),
                payload: MarkerPayload::Bucket(bucket.key()),
                z_index: 0,
                clustered: true,
            })?;
            table.insert(
                bucket.key(),
                PlacedMarker {
                    marker,
                    preset: style.preset,
                },
            );
        }

        Ok(table)
    }

    /// Recomputes every cluster's preset from its member markers. Returns
    /// the number of clusters restyled.
    ///
    /// # Errors
    ///
    /// * If the renderer fails to report or restyle clusters
    pub fn refresh_cluster_colors<R>(&self, renderer: &mut R) -> Result<usize, MapError>
    where
        R: MapRenderer + ?Sized,
    {
        let clusters = renderer.clusters()?;

        for cluster in &clusters {
            let presets = cluster
                .members
                .iter()
                .filter_map(|marker| self.markers.by_marker.get(marker))
                .filter_map(|key| self.markers.by_key.get(key))
                .map(|placed| placed.preset);
            renderer.set_cluster_preset(cluster.id, resolve_cluster_preset(presets))?;
        }

        log::trace!("Restyled {} clusters", clusters.len());
        Ok(clusters.len())
    }

    /// Reacts to a renderer event. Clicks resolve to an [`Interaction`];
    /// cluster changes recolor the clusters.
    ///
    /// # Errors
    ///
    /// * If the renderer fails while recoloring or reporting cluster members
    pub fn handle_event<R>(
        &self,
        renderer: &mut R,
        event: MapEvent,
    ) -> Result<Option<Interaction>, MapError>
    where
        R: MapRenderer + ?Sized,
    {
        match event {
            MapEvent::ClustersAdded | MapEvent::ViewportChanged(_) => {
                self.refresh_cluster_colors(renderer)?;
                Ok(None)
            }
            MapEvent::MarkerClicked(marker) => {
                let Some(key) = self.key_for_marker(marker) else {
                    log::debug!("Click on {marker} with no location");
                    return Ok(None);
                };
                Ok(Interaction::from_incidents(aggregate(&self.index, [key])))
            }
            MapEvent::ClusterClicked(cluster) => {
                let keys: Vec<BucketKey> = renderer
                    .cluster_members(cluster)?
                    .into_iter()
                    .filter_map(|marker| self.key_for_marker(marker))
                    .collect();
                Ok(Interaction::from_incidents(aggregate(&self.index, keys)))
            }
        }
    }

    /// Starts the highlight animation on `incident`.
    ///
    /// An incident without a placed marker is a no-op that leaves any
    /// running highlight untouched.
    pub fn focus<R, S>(
        &mut self,
        renderer: &mut R,
        scheduler: &mut S,
        incident: &Incident,
    ) -> FocusOutcome
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let key = self
            .index
            .key_for(incident.id)
            .or_else(|| incident.addresses.iter().find_map(address_key));
        let Some((key, placed)) = key.and_then(|key| Some((key, self.marker_for(&key)?))) else {
            log::debug!("Incident {} has no marker to focus", incident.id);
            return FocusOutcome::NoTarget;
        };

        self.animator.start(
            renderer,
            scheduler,
            FocusTarget {
                incident: incident.id,
                key,
                marker: placed.marker,
                preset: placed.preset,
            },
        )
    }

    /// Routes a scheduler callback to the animator. Returns `false` for
    /// callbacks that belong to no running session.
    pub fn dispatch<R, S>(&mut self, renderer: &mut R, scheduler: &mut S, wakeup: Wakeup) -> bool
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        match wakeup {
            Wakeup::Frame { handle, timestamp } => {
                self.animator
                    .on_frame(renderer, scheduler, handle, timestamp)
            }
            Wakeup::Timer(handle) => self.animator.on_timer(renderer, scheduler, handle),
        }
    }

    /// Stops the animation, unregisters every listener and destroys the
    /// canvas. Does nothing if already torn down.
    ///
    /// # Errors
    ///
    /// * If the renderer fails to destroy the canvas
    pub fn teardown<R, S>(&mut self, renderer: &mut R, scheduler: &mut S) -> Result<(), MapError>
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        self.animator.cancel(renderer, scheduler);
        for listener in self.listeners.drain(..) {
            if let Err(e) = renderer.unsubscribe(listener) {
                log::warn!("Failed to unregister {listener}: {e}");
            }
        }
        self.index = LocationIndex::default();
        self.markers = MarkerTable::default();

        renderer.destroy_canvas()?;
        log::info!("Destroyed map canvas");
        Ok(())
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        if self.open {
            log::warn!(
                "Map session dropped without teardown ({} listeners still registered)",
                self.listeners.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::index::tests::{address, incident};
    use crate::memory::{InMemoryRenderer, ManualScheduler};
    use incident_map_incident_models::Address;
    use incident_map_map_models::StylePolicy;

    fn open(config: MapConfig) -> (MapSession, InMemoryRenderer, ManualScheduler) {
        let mut renderer = InMemoryRenderer::new(config.cluster.radius_px);
        let session = MapSession::open(&mut renderer, config).unwrap();
        (session, renderer, ManualScheduler::new())
    }

    fn close(
        mut session: MapSession,
        renderer: &mut InMemoryRenderer,
        scheduler: &mut ManualScheduler,
    ) {
        session.teardown(renderer, scheduler).unwrap();
    }

    const fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn run(
        session: &mut MapSession,
        renderer: &mut InMemoryRenderer,
        scheduler: &mut ManualScheduler,
        by: Duration,
    ) {
        for wakeup in scheduler.advance(by) {
            session.dispatch(renderer, scheduler, wakeup);
        }
    }

    fn run_until_idle(
        session: &mut MapSession,
        renderer: &mut InMemoryRenderer,
        scheduler: &mut ManualScheduler,
    ) -> usize {
        let mut steps = 0;
        while !scheduler.is_idle() {
            run(session, renderer, scheduler, ms(16));
            steps += 1;
            assert!(steps < 1_000, "animation never settled");
        }
        steps
    }

    fn location_markers(renderer: &InMemoryRenderer) -> Vec<&MarkerSpec> {
        renderer
            .markers()
            .map(|(_, spec)| spec)
            .filter(|spec| matches!(spec.payload, MarkerPayload::Bucket(_)))
            .collect()
    }

    fn a() -> Incident {
        incident(1, "incident", vec![address(51.660_770, 39.200_280)])
    }

    fn b() -> Incident {
        incident(2, "seasonal", vec![address(51.660_770_001, 39.200_280_001)])
    }

    #[test]
    fn open_registers_listeners_and_teardown_removes_them() {
        let (session, mut renderer, mut scheduler) = open(MapConfig::default());
        assert_eq!(renderer.listener_count(), 4);
        assert_eq!(session.listeners().len(), 4);
        assert!(renderer.viewport().is_some());

        close(session, &mut renderer, &mut scheduler);
        assert_eq!(renderer.listener_count(), 0);
        assert_eq!(renderer.viewport(), None);
    }

    #[test]
    fn open_fails_when_canvas_is_unavailable() {
        let mut renderer = InMemoryRenderer::unavailable("no WebGL");
        let err = MapSession::open(&mut renderer, MapConfig::default()).unwrap_err();
        assert!(matches!(err, MapError::Render(RenderError::CanvasUnavailable { .. })));
    }

    #[test]
    fn failed_subscribe_unregisters_earlier_listeners() {
        let mut renderer = InMemoryRenderer::new(80.0);
        renderer.limit_listeners(2);

        let err = MapSession::open(&mut renderer, MapConfig::default()).unwrap_err();
        assert!(matches!(err, MapError::Render(RenderError::Backend { .. })));
        assert_eq!(renderer.listener_count(), 0);
        assert_eq!(renderer.orphaned_listeners(), 0);
        assert_eq!(renderer.viewport(), None);
        assert_eq!(renderer.canvases_created(), 1);
    }

    #[test]
    fn teardown_is_idempotent() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        session.teardown(&mut renderer, &mut scheduler).unwrap();
        session.teardown(&mut renderer, &mut scheduler).unwrap();
        assert!(!session.is_open());
    }

    #[test]
    fn shared_point_is_styled_by_first_incident_and_restyled_on_rebuild() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());

        session
            .set_incidents(&mut renderer, &mut scheduler, &[a(), b()])
            .unwrap();
        assert_eq!(session.index().len(), 1);
        let markers = location_markers(&renderer);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].preset, MarkerPreset::Red);
        assert_eq!(markers[0].tooltip, "2 incidents");
        assert_eq!(markers[0].callout.len(), 2);

        session
            .set_incidents(&mut renderer, &mut scheduler, &[b()])
            .unwrap();
        let markers = location_markers(&renderer);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].preset, MarkerPreset::Green);
        let bucket = session.index().buckets().next().unwrap();
        assert_eq!(bucket.incident_ids(), vec![IncidentId(2)]);

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn severity_policy_changes_marker_preset() {
        let config = MapConfig {
            style_policy: StylePolicy::Severity,
            ..MapConfig::default()
        };
        let (mut session, mut renderer, mut scheduler) = open(config);

        session
            .set_incidents(&mut renderer, &mut scheduler, &[b(), a()])
            .unwrap();
        assert_eq!(location_markers(&renderer)[0].preset, MarkerPreset::Red);

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn cluster_with_a_red_member_is_red() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        let incidents = vec![
            incident(1, "seasonal", vec![address(51.6600, 39.2000)]),
            incident(2, "planned", vec![address(51.6601, 39.2001)]),
            incident(3, "incident", vec![address(51.6602, 39.2002)]),
            incident(4, "inspection", vec![address(51.6603, 39.2003)]),
            incident(5, "planned", vec![address(52.5, 40.5)]),
            incident(6, "seasonal", vec![address(52.5001, 40.5001)]),
        ];

        session
            .set_incidents(&mut renderer, &mut scheduler, &incidents)
            .unwrap();

        let clusters = renderer.clusters().unwrap();
        assert_eq!(clusters.len(), 2);
        let presets: Vec<_> = clusters
            .iter()
            .map(|c| (c.members.len(), renderer.cluster_preset(c.id)))
            .collect();
        assert_eq!(
            presets,
            vec![
                (4, Some(MarkerPreset::Red)),
                (2, Some(MarkerPreset::Orange)),
            ]
        );

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn zoom_change_recolors_new_clusters() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        let incidents = vec![
            incident(1, "seasonal", vec![address(51.60, 39.20)]),
            incident(2, "incident", vec![address(51.70, 39.30)]),
        ];
        session
            .set_incidents(&mut renderer, &mut scheduler, &incidents)
            .unwrap();
        assert!(renderer.clusters().unwrap().is_empty());

        let event = renderer.zoom_to(5).unwrap();
        let event = renderer.deliver(event).unwrap();
        assert_eq!(session.handle_event(&mut renderer, event).unwrap(), None);

        let clusters = renderer.clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            renderer.cluster_preset(clusters[0].id),
            Some(MarkerPreset::Red)
        );

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn marker_click_selects_single_incident() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        session
            .set_incidents(&mut renderer, &mut scheduler, &[a()])
            .unwrap();
        let key = session.index().keys().next().unwrap();
        let marker = session.marker_for(&key).unwrap().marker;

        let interaction = session
            .handle_event(&mut renderer, MapEvent::MarkerClicked(marker))
            .unwrap();
        assert_eq!(interaction, Some(Interaction::Select(Box::new(a()))));

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn cluster_click_drills_down_across_members() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        let incidents = vec![
            incident(1, "incident", vec![address(51.6600, 39.2000)]),
            incident(
                2,
                "planned",
                vec![address(51.6600, 39.2000), address(51.6601, 39.2001)],
            ),
            incident(3, "seasonal", vec![address(51.6601, 39.2001)]),
        ];
        session
            .set_incidents(&mut renderer, &mut scheduler, &incidents)
            .unwrap();
        let cluster = renderer.clusters().unwrap()[0].id;

        let Some(Interaction::DrillDown(list)) = session
            .handle_event(&mut renderer, MapEvent::ClusterClicked(cluster))
            .unwrap()
        else {
            panic!("expected a drill-down list");
        };
        let ids: Vec<_> = list.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn focus_without_coordinates_is_a_no_op() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        let c = incident(
            3,
            "incident",
            vec![Address {
                latitude: None,
                longitude: Some(39.2.into()),
                ..Address::default()
            }],
        );
        session
            .set_incidents(&mut renderer, &mut scheduler, &[a(), c.clone()])
            .unwrap();
        let markers_before: Vec<_> = renderer.markers().map(|(id, _)| id).collect();

        assert_eq!(
            session.focus(&mut renderer, &mut scheduler, &c),
            FocusOutcome::NoTarget
        );
        assert_eq!(session.highlight_state(), HighlightState::Idle);
        assert!(renderer.flights().is_empty());
        assert_eq!(renderer.circles().count(), 0);
        assert_eq!(
            renderer.markers().map(|(id, _)| id).collect::<Vec<_>>(),
            markers_before
        );
        assert!(scheduler.is_idle());

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn refocus_leaves_one_session_that_completes() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        let d = incident(4, "incident", vec![address(51.60, 39.20)]);
        let e = incident(5, "planned", vec![address(51.70, 39.30)]);
        session
            .set_incidents(&mut renderer, &mut scheduler, &[d.clone(), e.clone()])
            .unwrap();

        assert_eq!(
            session.focus(&mut renderer, &mut scheduler, &d),
            FocusOutcome::Started
        );
        run(&mut session, &mut renderer, &mut scheduler, ms(520));
        assert_eq!(session.highlight_state(), HighlightState::Pulsing);
        let d_session = session.animator().session_id();

        assert_eq!(
            session.focus(&mut renderer, &mut scheduler, &e),
            FocusOutcome::Started
        );
        assert_ne!(session.animator().session_id(), d_session);
        assert_eq!(scheduler.pending_timers().len(), 1);
        assert!(scheduler.pending_frames().is_empty());

        let mut saw_fading = false;
        let mut steps = 0;
        while !scheduler.is_idle() {
            run(&mut session, &mut renderer, &mut scheduler, ms(16));
            saw_fading |= session.highlight_state() == HighlightState::Fading;
            assert!(renderer.circles().count() <= 1, "overlapping pulses");
            steps += 1;
            assert!(steps < 1_000, "animation never settled");
        }

        assert!(saw_fading);
        assert_eq!(session.highlight_state(), HighlightState::Idle);
        let e_key = session.index().key_for(e.id).unwrap();
        assert_eq!(
            renderer.open_callout(),
            Some(session.marker_for(&e_key).unwrap().marker)
        );
        assert_eq!(renderer.flights().len(), 2);
        assert_eq!(renderer.flights()[1].0, e_key.point());

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn destroyed_canvas_mid_animation_is_contained() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        session
            .set_incidents(&mut renderer, &mut scheduler, &[a()])
            .unwrap();
        session.focus(&mut renderer, &mut scheduler, &a());
        run(&mut session, &mut renderer, &mut scheduler, ms(500));

        renderer.break_canvas();
        run_until_idle(&mut session, &mut renderer, &mut scheduler);
        assert_eq!(session.highlight_state(), HighlightState::Idle);

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn rebuild_cancels_running_highlight() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        session
            .set_incidents(&mut renderer, &mut scheduler, &[a()])
            .unwrap();
        session.focus(&mut renderer, &mut scheduler, &a());
        run(&mut session, &mut renderer, &mut scheduler, ms(600));
        assert_eq!(session.highlight_state(), HighlightState::Pulsing);

        session
            .set_incidents(&mut renderer, &mut scheduler, &[b()])
            .unwrap();
        assert_eq!(session.highlight_state(), HighlightState::Idle);
        assert!(scheduler.is_idle());
        assert_eq!(renderer.circles().count(), 0);
        assert_eq!(renderer.markers().count(), 1);

        close(session, &mut renderer, &mut scheduler);
    }

    #[test]
    fn failed_rebuild_leaves_session_empty() {
        let (mut session, mut renderer, mut scheduler) = open(MapConfig::default());
        session
            .set_incidents(&mut renderer, &mut scheduler, &[a()])
            .unwrap();

        renderer.break_canvas();
        assert!(
            session
                .set_incidents(&mut renderer, &mut scheduler, &[a(), b()])
                .is_err()
        );
        assert!(session.index().is_empty());
        assert_eq!(session.marker_count(), 0);

        close(session, &mut renderer, &mut scheduler);
    }
}
