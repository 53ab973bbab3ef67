//! Presence inference: turns the three signals into a single indicator state.
//!
//! The engine carries no synchronization of its own. Callers serialize every
//! call to `tick`, `force` and `clear_force`.

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::controller::DeviceController;
use crate::messages::PresenceState;
use crate::signals::{CalendarSignal, DeviceActivitySignal, ForegroundAppSignal};

pub type StateObserver = Box<dyn Fn(PresenceState) + Send>;

/// Readings gathered during one tick, kept together for the debug trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Readings {
    activity: bool,
    is_trigger_app: bool,
    calendar_ok: bool,
}

impl Readings {
    fn verdict(self) -> PresenceState {
        if self.activity && (self.is_trigger_app || self.calendar_ok) {
            PresenceState::Active
        } else {
            PresenceState::Inactive
        }
    }
}

pub struct PresenceEngine {
    config: EngineConfig,
    device_activity: Box<dyn DeviceActivitySignal>,
    foreground_app: Box<dyn ForegroundAppSignal>,
    calendar: Box<dyn CalendarSignal>,
    controller: Box<dyn DeviceController>,
    observer: Option<StateObserver>,
    last_applied: PresenceState,
    forced: Option<PresenceState>,
}

impl PresenceEngine {
    pub fn new(
        config: EngineConfig,
        device_activity: Box<dyn DeviceActivitySignal>,
        foreground_app: Box<dyn ForegroundAppSignal>,
        calendar: Box<dyn CalendarSignal>,
        controller: Box<dyn DeviceController>,
    ) -> Self {
        PresenceEngine {
            config,
            device_activity,
            foreground_app,
            calendar,
            controller,
            observer: None,
            last_applied: PresenceState::Unknown,
            forced: None,
        }
    }

    /// Registers the single observer, replacing any previous one.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(PresenceState) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Last state actually applied to the light.
    pub fn state(&self) -> PresenceState {
        self.last_applied
    }

    pub fn forced_state(&self) -> Option<PresenceState> {
        self.forced
    }

    /// Pins the presence to `state` and applies it immediately. The pin is
    /// re-applied on every tick until `clear_force` or another `force`.
    pub fn force(&mut self, state: PresenceState) {
        if state == PresenceState::Unknown {
            warn!("Ignoring request to force presence to unknown");
            return;
        }
        info!("Forcing presence to {}", state);
        self.forced = Some(state);
        self.apply(state);
    }

    /// Returns to signal-driven presence on the next tick.
    pub fn clear_force(&mut self) {
        if let Some(state) = self.forced.take() {
            debug!("Cleared forced presence {}", state);
        }
    }

    pub fn tick(&mut self) {
        if let Some(state) = self.forced {
            debug!("Presence forced to {}, skipping signals", state);
            self.apply(state);
            return;
        }

        let readings = self.read_signals();
        let computed = readings.verdict();
        debug!("Signals {:?} -> {}", readings, computed);

        if computed != self.last_applied {
            self.apply(computed);
        } else {
            debug!("Presence unchanged ({})", computed);
        }
    }

    fn read_signals(&self) -> Readings {
        let frontmost = self.foreground_app.query();
        let is_trigger_app = frontmost
            .as_deref()
            .is_some_and(|app| self.config.trigger_applications.contains(app));

        let activity = if self.config.debug_force_activity_on_trigger && is_trigger_app {
            debug!("Assuming device activity for trigger app {:?}", frontmost);
            true
        } else {
            self.device_activity.query()
        };

        let calendar_ok = self.config.use_calendar_signal && self.calendar.query();

        Readings {
            activity,
            is_trigger_app,
            calendar_ok,
        }
    }

    fn apply(&mut self, state: PresenceState) {
        debug_assert_ne!(state, PresenceState::Unknown, "unknown presence is never applied");
        let Some(intent) = state.intent() else {
            return;
        };

        if state != self.last_applied {
            info!("Presence {} -> {}", self.last_applied, state);
        }
        self.last_applied = state;

        if let Some(observer) = &self.observer {
            observer(state);
        }
        self.controller.dispatch(intent, &self.config.control_identity);
    }
}
