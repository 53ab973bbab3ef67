//! Environmental signals consulted on every tick.
//!
//! Each source answers for "right now" and must map its own failures to the
//! safe default (`false` / `None`) instead of surfacing them.

mod calendar;
mod device;
mod foreground;

pub use calendar::EventFileCalendar;
pub use device::ProcDeviceActivity;
pub use foreground::CommandForegroundApp;

/// Is a camera or microphone currently captured by any process.
pub trait DeviceActivitySignal: Send {
    fn query(&self) -> bool;
}

/// Identifier of the frontmost application, if one can be resolved.
pub trait ForegroundAppSignal: Send {
    fn query(&self) -> Option<String>;
}

/// Is a meeting-like calendar event running at this instant.
pub trait CalendarSignal: Send {
    fn query(&self) -> bool;
}

/// Source that never observes anything. Used when a signal is disabled or
/// unsupported on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSignal;

impl DeviceActivitySignal for NullSignal {
    fn query(&self) -> bool {
        false
    }
}

impl ForegroundAppSignal for NullSignal {
    fn query(&self) -> Option<String> {
        None
    }
}

impl CalendarSignal for NullSignal {
    fn query(&self) -> bool {
        false
    }
}
