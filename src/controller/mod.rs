//! Outbound commands to the indicator light.

mod luxafor;

pub use luxafor::LuxaforClient;

use log::info;

use crate::messages::Intent;

/// Best-effort sink for indicator commands. Implementations must not block the
/// caller on delivery and report nothing back.
pub trait DeviceController: Send {
    fn set_active(&self, identity: &str);
    fn set_inactive(&self, identity: &str);

    fn dispatch(&self, intent: Intent, identity: &str) {
        match intent {
            Intent::ShowActive => self.set_active(identity),
            Intent::ShowInactive => self.set_inactive(identity),
        }
    }
}

/// Controller that only logs, for running without touching the real light.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogController;

impl DeviceController for LogController {
    fn set_active(&self, identity: &str) {
        info!("[dry-run] light {} -> red", identity);
    }

    fn set_inactive(&self, identity: &str) {
        info!("[dry-run] light {} -> off", identity);
    }
}
