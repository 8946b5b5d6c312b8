//! Ports the engine drives: the map renderer and the host's frame/timer
//! scheduler.
//!
//! The engine owns no canvas and no event loop. A view hands it one
//! implementation of each trait; [`crate::memory`] has in-memory ones.

use std::time::Duration;

use geo::Point;
use incident_map_map_models::{
    CircleSpec, ClusterId, ClusterSnapshot, FrameHandle, ListenerId, MapEventKind, MarkerId,
    MarkerPreset, MarkerSpec, ShapeId, TimerHandle, Viewport,
};

/// Errors reported by a [`MapRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The canvas could not be created.
    #[error("map canvas is not available: {message}")]
    CanvasUnavailable {
        /// Reason reported by the renderer.
        message: String,
    },

    /// The canvas was destroyed (or never created).
    #[error("map canvas has been destroyed")]
    CanvasDestroyed,

    /// A handle did not refer to a live object.
    #[error("unknown {kind} handle {id}")]
    UnknownHandle {
        /// Object kind (`"marker"`, `"cluster"`, ...).
        kind: &'static str,
        /// The raw handle value.
        id: u64,
    },

    /// Any other backend failure.
    #[error("renderer error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// A 2-D map canvas with markers, a clusterer and transient geometry.
///
/// Cluster membership belongs to the renderer; the engine only reads it
/// back to recolor clusters and to drill down.
pub trait MapRenderer {
    /// Creates the canvas bound to `viewport`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CanvasUnavailable`] if the canvas cannot be
    /// created.
    fn create_canvas(&mut self, viewport: Viewport) -> Result<(), RenderError>;

    /// Destroys the canvas and everything on it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the backend fails to tear down.
    fn destroy_canvas(&mut self) -> Result<(), RenderError>;

    /// Registers interest in one event family.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn subscribe(&mut self, kind: MapEventKind) -> Result<ListenerId, RenderError>;

    /// Unregisters a listener.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the listener is unknown or the canvas is gone.
    fn unsubscribe(&mut self, listener: ListenerId) -> Result<(), RenderError>;

    /// Places a marker.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn add_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerId, RenderError>;

    /// Removes one marker.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the marker is unknown or the canvas is gone.
    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), RenderError>;

    /// Removes every clustered marker.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn clear_markers(&mut self) -> Result<(), RenderError>;

    /// Current clusters and their members.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn clusters(&mut self) -> Result<Vec<ClusterSnapshot>, RenderError>;

    /// Members of one cluster.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the cluster is unknown or the canvas is gone.
    fn cluster_members(&mut self, cluster: ClusterId) -> Result<Vec<MarkerId>, RenderError>;

    /// Restyles a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the cluster is unknown or the canvas is gone.
    fn set_cluster_preset(
        &mut self,
        cluster: ClusterId,
        preset: MarkerPreset,
    ) -> Result<(), RenderError>;

    /// Draws a circle.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn add_circle(&mut self, circle: &CircleSpec) -> Result<ShapeId, RenderError>;

    /// Changes radius/opacity of a circle.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the circle is unknown or the canvas is gone.
    fn update_circle(&mut self, shape: ShapeId, circle: &CircleSpec) -> Result<(), RenderError>;

    /// Removes a circle.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the circle is unknown or the canvas is gone.
    fn remove_circle(&mut self, shape: ShapeId) -> Result<(), RenderError>;

    /// Animates the viewport center to `center` over `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the canvas is gone.
    fn fly_to(&mut self, center: Point<f64>, duration: Duration) -> Result<(), RenderError>;

    /// Opens a marker's info callout.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the marker is unknown or the canvas is gone.
    fn open_callout(&mut self, marker: MarkerId) -> Result<(), RenderError>;

    /// Closes a marker's info callout.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the marker is unknown or the canvas is gone.
    fn close_callout(&mut self, marker: MarkerId) -> Result<(), RenderError>;
}

/// The host's cooperative scheduling primitives.
///
/// Handles are never reused, so a handle from a cancelled request can
/// never be mistaken for a live one.
pub trait FrameScheduler {
    /// Monotonic time since the host started.
    fn now(&self) -> Duration;

    /// Requests a callback on the next display refresh.
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancels a pending frame request. Unknown handles are ignored.
    fn cancel_frame(&mut self, frame: FrameHandle);

    /// Schedules a one-shot callback after `delay`.
    fn set_timer(&mut self, delay: Duration) -> TimerHandle;

    /// Cancels a pending timer. Unknown handles are ignored.
    fn clear_timer(&mut self, timer: TimerHandle);
}

/// A scheduler callback that became due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A requested animation frame, with the frame timestamp.
    Frame {
        /// The request that fired.
        handle: FrameHandle,
        /// Frame timestamp.
        timestamp: Duration,
    },
    /// A timer that expired.
    Timer(TimerHandle),
}
