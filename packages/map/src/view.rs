//! Host-facing map view.
//!
//! A [`MapView`] owns the renderer, the scheduler and at most one
//! [`MapSession`]. It never fails: a canvas that cannot be created turns
//! into an inline notice, renderer errors during interaction are logged,
//! and the view keeps its incident list so a later remount can draw it.

use std::fmt;
use std::time::Duration;

use incident_map_incident_models::{Incident, IncidentId};
use incident_map_map_models::{HighlightState, MapConfig, MapEvent};

use crate::drill_down::Interaction;
use crate::highlight::FocusOutcome;
use crate::memory::ManualScheduler;
use crate::ports::{FrameScheduler, MapRenderer, Wakeup};
use crate::session::MapSession;

type SelectCallback = Box<dyn FnMut(&Incident)>;

/// A map view bound to one renderer.
pub struct MapView<R: MapRenderer, S: FrameScheduler> {
    renderer: R,
    scheduler: S,
    config: MapConfig,
    session: Option<MapSession>,
    incidents: Vec<Incident>,
    notice: Option<String>,
    on_select: Option<SelectCallback>,
}

impl<R: MapRenderer, S: FrameScheduler> MapView<R, S> {
    /// Creates an unmounted view.
    #[must_use]
    pub fn new(renderer: R, scheduler: S, config: MapConfig) -> Self {
        Self {
            renderer,
            scheduler,
            config,
            session: None,
            incidents: Vec::new(),
            notice: None,
            on_select: None,
        }
    }

    /// Registers the callback invoked whenever an interaction resolves to
    /// a single incident.
    pub fn on_select(&mut self, callback: impl FnMut(&Incident) + 'static) {
        self.on_select = Some(Box::new(callback));
    }

    /// Creates the canvas and draws the current incidents. Any previous
    /// canvas is destroyed first.
    ///
    /// Returns `false` if the canvas could not be created; the reason is
    /// available from [`Self::notice`].
    pub fn mount(&mut self) -> bool {
        self.unmount();

        let session = match MapSession::open(&mut self.renderer, self.config.clone()) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Map unavailable: {e}");
                self.notice = Some(format!("The map could not be displayed: {e}"));
                return false;
            }
        };

        self.notice = None;
        self.session = Some(session);
        self.redraw();
        true
    }

    /// Destroys the canvas, if any.
    pub fn unmount(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.teardown(&mut self.renderer, &mut self.scheduler)
        {
            log::warn!("Map teardown failed: {e}");
        }
    }

    /// Whether a canvas is mounted.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Replaces the incident list and redraws it if mounted.
    pub fn set_incidents(&mut self, incidents: Vec<Incident>) {
        self.incidents = incidents;
        self.redraw();
    }

    fn redraw(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let (renderer, scheduler) = (&mut self.renderer, &mut self.scheduler);
        if let Err(e) = session.set_incidents(renderer, scheduler, &self.incidents) {
            log::error!("Failed to draw incidents: {e}");
            self.notice = Some(format!("Incidents could not be drawn: {e}"));
        }
    }

    /// The current incident list.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Highlights `incident` on the map.
    pub fn focus(&mut self, incident: &Incident) -> FocusOutcome {
        match self.session.as_mut() {
            Some(session) => session.focus(&mut self.renderer, &mut self.scheduler, incident),
            None => {
                log::debug!(
                    "Ignoring focus on incident {}: map not mounted",
                    incident.id
                );
                FocusOutcome::NoTarget
            }
        }
    }

    /// Reacts to a renderer event. A single-incident result is also handed
    /// to the selection callback.
    pub fn handle_event(&mut self, event: MapEvent) -> Option<Interaction> {
        let session = self.session.as_ref()?;

        let interaction = match session.handle_event(&mut self.renderer, event) {
            Ok(interaction) => interaction,
            Err(e) => {
                log::error!("Failed to handle {} event: {e}", event.kind());
                return None;
            }
        };

        if let (Some(Interaction::Select(incident)), Some(callback)) =
            (&interaction, self.on_select.as_mut())
        {
            callback(incident);
        }
        interaction
    }

    /// Picks one incident from a drill-down list and hands it to the
    /// selection callback.
    pub fn choose(&mut self, id: IncidentId) -> Option<Incident> {
        let incident = self
            .session
            .as_ref()
            .and_then(|session| session.incident(id))
            .or_else(|| self.incidents.iter().find(|incident| incident.id == id))
            .cloned();

        match (&incident, self.on_select.as_mut()) {
            (Some(incident), Some(callback)) => callback(incident),
            (None, _) => log::debug!("Drill-down choice {id} is not in the view"),
            (Some(_), None) => {}
        }
        incident
    }

    /// Routes a scheduler callback to the running animation.
    pub fn dispatch(&mut self, wakeup: Wakeup) -> bool {
        self.session.as_mut().is_some_and(|session| {
            session.dispatch(&mut self.renderer, &mut self.scheduler, wakeup)
        })
    }

    /// The inline error notice, if any.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Hides the inline notice.
    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Phase of the highlight animation.
    #[must_use]
    pub fn highlight_state(&self) -> HighlightState {
        self.session
            .as_ref()
            .map_or(HighlightState::Idle, MapSession::highlight_state)
    }

    /// The mounted session.
    #[must_use]
    pub const fn session(&self) -> Option<&MapSession> {
        self.session.as_ref()
    }

    /// The renderer.
    #[must_use]
    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably (for hosts that feed it input).
    pub const fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }
}

impl<R: MapRenderer> MapView<R, ManualScheduler> {
    /// Advances the virtual clock and dispatches whatever became due.
    /// Returns the number of callbacks that belonged to the animation.
    pub fn advance(&mut self, by: Duration) -> usize {
        let wakeups = self.scheduler.advance(by);
        wakeups
            .into_iter()
            .filter(|wakeup| self.dispatch(*wakeup))
            .count()
    }

    /// Advances in `step` increments until nothing is pending or
    /// `max_steps` is reached. Returns the number of steps taken.
    pub fn run_until_idle(&mut self, step: Duration, max_steps: usize) -> usize {
        let mut steps = 0;
        while !self.scheduler.is_idle() && steps < max_steps {
            self.advance(step);
            steps += 1;
        }
        steps
    }
}

impl<R: MapRenderer, S: FrameScheduler> Drop for MapView<R, S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<R: MapRenderer + fmt::Debug, S: FrameScheduler + fmt::Debug> fmt::Debug for MapView<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapView")
            .field("renderer", &self.renderer)
            .field("scheduler", &self.scheduler)
            .field("session", &self.session)
            .field("incidents", &self.incidents.len())
            .field("notice", &self.notice)
            .field("on_select", &self.on_select.is_some())
            .finish_non_exhaustive()
    }
}
