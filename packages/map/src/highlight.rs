//! Focus/highlight animation.
//!
//! `Idle -> Centering -> Pulsing -> Fading -> Idle`. Focusing an incident
//! recenters the map and drops a highlight marker on top of its location
//! (`Centering`); once the recenter has had time to finish a circle pulses
//! outward while fading (`Pulsing`, one frame request at a time); at the
//! end the circle goes away, the location's callout opens and the
//! highlight marker lingers briefly (`Fading`) before being removed.
//!
//! At most one session runs. Every pending frame or timer belongs to the
//! session that requested it and is cancelled with it, so a late callback
//! from an older session is recognized by its handle and ignored. Renderer
//! failures end the session; they are logged and never propagated.
//!
//! The callout opened at the end of a session outlives it and is closed
//! when the next focus starts or the animator is cancelled.

use std::time::Duration;

use incident_map_incident_models::IncidentId;
use incident_map_map_models::{
    BucketKey, CircleSpec, FrameHandle, HighlightConfig, HighlightState, MarkerId, MarkerPayload,
    MarkerPreset, MarkerSpec, PulseFrame, ShapeId, TimerHandle,
};
use uuid::Uuid;

use crate::ports::{FrameScheduler, MapRenderer, RenderError};

/// The location marker to highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTarget {
    /// The focused incident.
    pub incident: IncidentId,
    /// Its location.
    pub key: BucketKey,
    /// The location's marker (its callout opens at the end).
    pub marker: MarkerId,
    /// Preset used for the highlight marker and the pulse.
    pub preset: MarkerPreset,
}

/// Result of a focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    /// A highlight session started.
    Started,
    /// The incident has no marker; nothing changed.
    NoTarget,
    /// The renderer failed; nothing is left running.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Centering(TimerHandle),
    Pulsing { frame: FrameHandle, circle: ShapeId },
    Fading(TimerHandle),
}

#[derive(Debug)]
struct HighlightSession {
    id: Uuid,
    target: FocusTarget,
    highlight_marker: MarkerId,
    pulse_started: Duration,
    phase: Phase,
}

impl HighlightSession {
    const fn state(&self) -> HighlightState {
        match self.phase {
            Phase::Centering(_) => HighlightState::Centering,
            Phase::Pulsing { .. } => HighlightState::Pulsing,
            Phase::Fading(_) => HighlightState::Fading,
        }
    }

    fn circle(&self, pulse: PulseFrame) -> CircleSpec {
        CircleSpec {
            center: self.target.key.point(),
            radius_m: pulse.radius_m,
            stroke_opacity: pulse.stroke_opacity,
            fill_opacity: pulse.fill_opacity,
            preset: self.target.preset,
        }
    }
}

/// Runs at most one highlight session at a time.
#[derive(Debug)]
pub struct HighlightAnimator {
    config: HighlightConfig,
    session: Option<HighlightSession>,
    callout: Option<MarkerId>,
}

impl HighlightAnimator {
    /// Creates an idle animator.
    #[must_use]
    pub const fn new(config: HighlightConfig) -> Self {
        Self {
            config,
            session: None,
            callout: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> HighlightState {
        self.session
            .as_ref()
            .map_or(HighlightState::Idle, HighlightSession::state)
    }

    /// Id of the running session.
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Target of the running session.
    #[must_use]
    pub fn target(&self) -> Option<FocusTarget> {
        self.session.as_ref().map(|s| s.target)
    }

    /// Marker whose callout was opened by the last finished session.
    #[must_use]
    pub const fn open_callout(&self) -> Option<MarkerId> {
        self.callout
    }

    /// Cancels any running session and starts a new one on `target`.
    pub fn start<R, S>(
        &mut self,
        renderer: &mut R,
        scheduler: &mut S,
        target: FocusTarget,
    ) -> FocusOutcome
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        self.cancel(renderer, scheduler);

        match Self::begin_centering(&self.config, renderer, scheduler, target) {
            Ok((highlight_marker, timer)) => {
                let id = Uuid::new_v4();
                log::debug!(
                    "Highlight {id}: centering on incident {} at {}",
                    target.incident,
                    target.key
                );
                self.session = Some(HighlightSession {
                    id,
                    target,
                    highlight_marker,
                    pulse_started: Duration::ZERO,
                    phase: Phase::Centering(timer),
                });
                FocusOutcome::Started
            }
            Err(e) => {
                log::error!(
                    "Failed to highlight incident {} at {}: {e}",
                    target.incident,
                    target.key
                );
                FocusOutcome::Failed
            }
        }
    }

    /// Handles an expired timer. Returns `false` if the timer does not
    /// belong to the running session.
    pub fn on_timer<R, S>(
        &mut self,
        renderer: &mut R,
        scheduler: &mut S,
        timer: TimerHandle,
    ) -> bool
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let Some(session) = self.session.as_mut() else {
            log::trace!("Ignoring timer {timer}: no highlight running");
            return false;
        };

        let phase = session.phase;
        match phase {
            Phase::Centering(pending) if pending == timer => {
                let result = Self::begin_pulse(&self.config, session, renderer, scheduler);
                if let Err(e) = result {
                    self.abort(renderer, scheduler, &e);
                }
                true
            }
            Phase::Fading(pending) if pending == timer => {
                if let Some(finished) = self.session.take() {
                    if let Err(e) = renderer.remove_marker(finished.highlight_marker) {
                        log::error!("Highlight {}: failed to remove marker: {e}", finished.id);
                    }
                    log::debug!("Highlight {}: done", finished.id);
                }
                true
            }
            _ => {
                log::trace!("Ignoring stale timer {timer}");
                false
            }
        }
    }

    /// Handles an animation frame. Returns `false` if the frame does not
    /// belong to the running session.
    pub fn on_frame<R, S>(
        &mut self,
        renderer: &mut R,
        scheduler: &mut S,
        frame: FrameHandle,
        timestamp: Duration,
    ) -> bool
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let Some(session) = self.session.as_mut() else {
            log::trace!("Ignoring frame {frame}: no highlight running");
            return false;
        };
        let Phase::Pulsing {
            frame: pending,
            circle,
        } = session.phase
        else {
            log::trace!("Ignoring frame {frame} outside of the pulse");
            return false;
        };
        if pending != frame {
            log::trace!("Ignoring stale frame {frame}");
            return false;
        }

        let pulse = Self::advance_pulse(
            &self.config,
            session,
            circle,
            renderer,
            scheduler,
            timestamp,
        );
        match pulse {
            Ok(Some(callout)) => self.callout = Some(callout),
            Ok(None) => {}
            Err(e) => self.abort(renderer, scheduler, &e),
        }
        true
    }

    /// Stops the running session, releasing its frame request, timers and
    /// geometry, and closes the callout left open by a finished one.
    /// Returns `false` when no session was running.
    pub fn cancel<R, S>(&mut self, renderer: &mut R, scheduler: &mut S) -> bool
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        if let Some(marker) = self.callout.take()
            && let Err(e) = renderer.close_callout(marker)
        {
            log::debug!("Callout of {marker} already closed: {e}");
        }

        let Some(session) = self.session.take() else {
            return false;
        };

        match session.phase {
            Phase::Centering(timer) | Phase::Fading(timer) => scheduler.clear_timer(timer),
            Phase::Pulsing { frame, circle } => {
                scheduler.cancel_frame(frame);
                if let Err(e) = renderer.remove_circle(circle) {
                    log::debug!("Highlight {}: circle already gone: {e}", session.id);
                }
            }
        }
        if let Err(e) = renderer.remove_marker(session.highlight_marker) {
            log::debug!("Highlight {}: marker already gone: {e}", session.id);
        }

        log::debug!(
            "Highlight {}: cancelled while {}",
            session.id,
            session.state()
        );
        true
    }

    fn abort<R, S>(&mut self, renderer: &mut R, scheduler: &mut S, error: &RenderError)
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        if let Some(session) = &self.session {
            log::error!(
                "Highlight {} for incident {} aborted: {error}",
                session.id,
                session.target.incident
            );
        }
        self.cancel(renderer, scheduler);
    }

    fn begin_centering<R, S>(
        config: &HighlightConfig,
        renderer: &mut R,
        scheduler: &mut S,
        target: FocusTarget,
    ) -> Result<(MarkerId, TimerHandle), RenderError>
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let center = target.key.point();
        renderer.fly_to(center, config.pan())?;
        let highlight_marker = renderer.add_marker(&MarkerSpec {
            position: center,
            preset: target.preset,
            tooltip: String::new(),
            callout: Vec::new(),
            payload: MarkerPayload::Highlight,
            z_index: config.marker_z_index,
            clustered: false,
        })?;
        Ok((highlight_marker, scheduler.set_timer(config.pan())))
    }

    fn begin_pulse<R, S>(
        config: &HighlightConfig,
        session: &mut HighlightSession,
        renderer: &mut R,
        scheduler: &mut S,
    ) -> Result<(), RenderError>
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let circle = renderer.add_circle(&session.circle(config.pulse_at(0.0)))?;
        session.pulse_started = scheduler.now();
        session.phase = Phase::Pulsing {
            frame: scheduler.request_frame(),
            circle,
        };
        log::trace!("Highlight {}: pulsing", session.id);
        Ok(())
    }

    fn advance_pulse<R, S>(
        config: &HighlightConfig,
        session: &mut HighlightSession,
        circle: ShapeId,
        renderer: &mut R,
        scheduler: &mut S,
        timestamp: Duration,
    ) -> Result<Option<MarkerId>, RenderError>
    where
        R: MapRenderer + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let f = config.fraction(timestamp.saturating_sub(session.pulse_started));

        if f < 1.0 {
            renderer.update_circle(circle, &session.circle(config.pulse_at(f)))?;
            session.phase = Phase::Pulsing {
                frame: scheduler.request_frame(),
                circle,
            };
            return Ok(None);
        }

        renderer.remove_circle(circle)?;
        session.phase = Phase::Fading(scheduler.set_timer(config.linger()));
        renderer.open_callout(session.target.marker)?;
        log::trace!("Highlight {}: fading", session.id);
        Ok(Some(session.target.marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRenderer, ManualScheduler};
    use crate::ports::Wakeup;
    use geo::Point;
    use incident_map_map_models::Viewport;

    const FRAME: Duration = Duration::from_millis(16);

    const fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn setup() -> (InMemoryRenderer, ManualScheduler, FocusTarget) {
        let mut renderer = InMemoryRenderer::new(80.0);
        renderer
            .create_canvas(Viewport {
                center: Point::new(39.0, 51.0),
                zoom: 12,
                width_px: 800,
                height_px: 600,
            })
            .unwrap();
        let key = BucketKey::from_degrees(51.66077, 39.20028).unwrap();
        let marker = renderer
            .add_marker(&MarkerSpec {
                position: key.point(),
                preset: MarkerPreset::Red,
                tooltip: "Water main break".to_string(),
                callout: Vec::new(),
                payload: MarkerPayload::Bucket(key),
                z_index: 0,
                clustered: true,
            })
            .unwrap();
        let target = FocusTarget {
            incident: IncidentId(1),
            key,
            marker,
            preset: MarkerPreset::Red,
        };
        (renderer, ManualScheduler::new(), target)
    }

    fn pump(
        animator: &mut HighlightAnimator,
        renderer: &mut InMemoryRenderer,
        scheduler: &mut ManualScheduler,
        by: Duration,
    ) {
        for wakeup in scheduler.advance(by) {
            match wakeup {
                Wakeup::Frame { handle, timestamp } => {
                    animator.on_frame(renderer, scheduler, handle, timestamp);
                }
                Wakeup::Timer(handle) => {
                    animator.on_timer(renderer, scheduler, handle);
                }
            }
        }
    }

    fn finish(
        animator: &mut HighlightAnimator,
        renderer: &mut InMemoryRenderer,
        scheduler: &mut ManualScheduler,
    ) {
        for _ in 0..1_000 {
            if animator.state() == HighlightState::Idle {
                return;
            }
            pump(animator, renderer, scheduler, FRAME);
        }
        panic!("highlight never finished");
    }

    fn highlight_markers(renderer: &InMemoryRenderer) -> usize {
        renderer
            .markers()
            .filter(|(_, spec)| spec.payload == MarkerPayload::Highlight)
            .count()
    }

    #[test]
    fn runs_through_every_phase() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        assert_eq!(
            animator.start(&mut renderer, &mut scheduler, target),
            FocusOutcome::Started
        );
        assert_eq!(animator.state(), HighlightState::Centering);
        assert_eq!(renderer.flights(), &[(target.key.point(), ms(500))]);
        assert_eq!(highlight_markers(&renderer), 1);

        pump(&mut animator, &mut renderer, &mut scheduler, ms(500));
        assert_eq!(animator.state(), HighlightState::Pulsing);
        let (_, circle) = renderer.circles().next().unwrap();
        assert!((circle.radius_m - 10.0).abs() < 1e-9);

        let mut last_radius = circle.radius_m;
        let mut last_opacity = circle.fill_opacity;
        let mut frames = 0;
        while animator.state() == HighlightState::Pulsing {
            pump(&mut animator, &mut renderer, &mut scheduler, FRAME);
            frames += 1;
            if let Some((_, circle)) = renderer.circles().next() {
                assert!(circle.radius_m >= last_radius, "radius shrank");
                assert!(circle.fill_opacity <= last_opacity, "opacity grew");
                last_radius = circle.radius_m;
                last_opacity = circle.fill_opacity;
            }
            assert!(frames < 200, "pulse never finished");
        }

        assert_eq!(frames, 94);
        assert_eq!(animator.state(), HighlightState::Fading);
        assert_eq!(renderer.circles().count(), 0);
        assert_eq!(renderer.open_callout(), Some(target.marker));
        assert_eq!(highlight_markers(&renderer), 1);

        pump(&mut animator, &mut renderer, &mut scheduler, ms(999));
        assert_eq!(animator.state(), HighlightState::Fading);
        pump(&mut animator, &mut renderer, &mut scheduler, ms(1));
        assert_eq!(animator.state(), HighlightState::Idle);
        assert_eq!(highlight_markers(&renderer), 0);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        assert!(!animator.cancel(&mut renderer, &mut scheduler));

        animator.start(&mut renderer, &mut scheduler, target);
        pump(&mut animator, &mut renderer, &mut scheduler, ms(500));
        assert_eq!(animator.state(), HighlightState::Pulsing);

        assert!(animator.cancel(&mut renderer, &mut scheduler));
        assert!(!animator.cancel(&mut renderer, &mut scheduler));
        assert_eq!(animator.state(), HighlightState::Idle);
        assert!(scheduler.is_idle());
        assert_eq!(renderer.circles().count(), 0);
        assert_eq!(highlight_markers(&renderer), 0);
    }

    #[test]
    fn new_focus_supersedes_running_session() {
        let (mut renderer, mut scheduler, first) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        animator.start(&mut renderer, &mut scheduler, first);
        pump(&mut animator, &mut renderer, &mut scheduler, ms(500));
        pump(&mut animator, &mut renderer, &mut scheduler, FRAME);
        let stale_frame = scheduler.pending_frames()[0];
        let first_session = animator.session_id();

        let second = FocusTarget {
            incident: IncidentId(2),
            ..first
        };
        animator.start(&mut renderer, &mut scheduler, second);

        assert_ne!(animator.session_id(), first_session);
        assert_eq!(animator.target(), Some(second));
        assert_eq!(animator.state(), HighlightState::Centering);
        assert!(scheduler.pending_frames().is_empty());
        assert_eq!(scheduler.pending_timers().len(), 1);
        assert_eq!(renderer.circles().count(), 0);
        assert_eq!(highlight_markers(&renderer), 1);

        assert!(!animator.on_frame(
            &mut renderer,
            &mut scheduler,
            stale_frame,
            Duration::from_millis(600)
        ));
        assert_eq!(animator.state(), HighlightState::Centering);
        assert_eq!(renderer.circles().count(), 0);
    }

    #[test]
    fn renderer_failure_mid_pulse_ends_session() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        animator.start(&mut renderer, &mut scheduler, target);
        pump(&mut animator, &mut renderer, &mut scheduler, ms(500));
        assert_eq!(animator.state(), HighlightState::Pulsing);

        renderer.break_canvas();
        pump(&mut animator, &mut renderer, &mut scheduler, FRAME);

        assert_eq!(animator.state(), HighlightState::Idle);
        assert!(scheduler.is_idle(), "frame request leaked");
    }

    #[test]
    fn renderer_failure_on_start_leaves_nothing_running() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());
        renderer.break_canvas();

        assert_eq!(
            animator.start(&mut renderer, &mut scheduler, target),
            FocusOutcome::Failed
        );
        assert_eq!(animator.state(), HighlightState::Idle);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn callout_failure_releases_linger_timer() {
        let (mut renderer, mut scheduler, mut target) = setup();
        target.marker = MarkerId(9999);
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        animator.start(&mut renderer, &mut scheduler, target);
        pump(&mut animator, &mut renderer, &mut scheduler, ms(500));
        pump(&mut animator, &mut renderer, &mut scheduler, ms(1600));

        assert_eq!(animator.state(), HighlightState::Idle);
        assert!(scheduler.is_idle());
        assert_eq!(highlight_markers(&renderer), 0);
    }

    #[test]
    fn next_focus_closes_the_previous_callout() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        animator.start(&mut renderer, &mut scheduler, target);
        finish(&mut animator, &mut renderer, &mut scheduler);
        assert_eq!(renderer.open_callout(), Some(target.marker));
        assert_eq!(animator.open_callout(), Some(target.marker));

        animator.start(&mut renderer, &mut scheduler, target);
        assert_eq!(renderer.open_callout(), None);
        assert_eq!(animator.open_callout(), None);
        assert_eq!(animator.state(), HighlightState::Centering);

        finish(&mut animator, &mut renderer, &mut scheduler);
        assert_eq!(renderer.open_callout(), Some(target.marker));
    }

    #[test]
    fn cancel_closes_callout_after_the_session_ended() {
        let (mut renderer, mut scheduler, target) = setup();
        let mut animator = HighlightAnimator::new(HighlightConfig::default());

        animator.start(&mut renderer, &mut scheduler, target);
        finish(&mut animator, &mut renderer, &mut scheduler);
        assert_eq!(renderer.open_callout(), Some(target.marker));

        assert!(!animator.cancel(&mut renderer, &mut scheduler));
        assert_eq!(renderer.open_callout(), None);
        assert_eq!(animator.open_callout(), None);
    }
}
