use std::fmt;

use serde_derive::Serialize;

/// Inferred meeting presence. `Unknown` only exists before the first apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Unknown,
    Active,
    Inactive,
}

impl PresenceState {
    /// The device command this state maps to. `Unknown` has none.
    pub fn intent(self) -> Option<Intent> {
        match self {
            PresenceState::Active => Some(Intent::ShowActive),
            PresenceState::Inactive => Some(Intent::ShowInactive),
            PresenceState::Unknown => None,
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresenceState::Unknown => "unknown",
            PresenceState::Active => "active",
            PresenceState::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    ShowActive,
    ShowInactive,
}

/// Remote control requests received over MQTT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlAnnouncement {
    Force(PresenceState),
    ClearForce,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_has_no_intent() {
        assert_eq!(PresenceState::Unknown.intent(), None);
        assert_eq!(PresenceState::Active.intent(), Some(Intent::ShowActive));
        assert_eq!(PresenceState::Inactive.intent(), Some(Intent::ShowInactive));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&PresenceState::Inactive).unwrap();
        assert_eq!(json, "\"inactive\"");
        assert_eq!(PresenceState::Active.to_string(), "active");
    }
}
