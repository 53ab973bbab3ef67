use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;

pub const DEFAULT_CONTROL_IDENTITY: &str = "YOUR_USER_ID_HERE";
pub const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 2.0;
const APP_DIR_NAME: &str = "luxafor-presence";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Applications treated as meeting software when nothing else is configured.
/// macOS bundle identifiers first, then Linux window classes.
pub const DEFAULT_TRIGGER_APPLICATIONS: &[&str] = &[
    "us.zoom.xos",
    "com.microsoft.teams2",
    "com.microsoft.teams",
    "com.cisco.webex.meetingapp",
    "com.slack.slack",
    "com.google.Chrome",
    "com.apple.Safari",
    "zoom",
    "teams-for-linux",
    "Slack",
    "Google-chrome",
    "firefox",
];

/// One configuration layer, or several merged together. Every field is optional
/// so that layers can fill each other's gaps.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    pub control_identity: Option<String>,
    pub poll_interval_seconds: Option<f64>,
    pub trigger_applications: Option<Vec<String>>,
    pub use_calendar_signal: Option<bool>,
    pub debug_force_activity_on_trigger: Option<bool>,
    pub luxafor: Option<LuxaforConfig>,
    pub mqtt: Option<MqttConfig>,
    pub calendar: Option<CalendarConfig>,
    pub foreground: Option<ForegroundConfig>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LuxaforConfig {
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// `host` is optional here only so layers can supply it separately; MQTT stays
/// disabled unless the merged result carries one.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CalendarConfig {
    pub events_path: Option<PathBuf>,
    pub meeting_markers: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ForegroundConfig {
    /// Program followed by its arguments; stdout is the application identifier.
    pub command: Option<Vec<String>>,
}

impl LuxaforConfig {
    fn from_table(table: &toml::Table) -> Self {
        LuxaforConfig {
            endpoint: field(table, "luxafor.endpoint"),
            timeout_seconds: field(table, "luxafor.timeout_seconds"),
        }
    }

    fn merge(self, lower: Self) -> Self {
        LuxaforConfig {
            endpoint: self.endpoint.or(lower.endpoint),
            timeout_seconds: self.timeout_seconds.or(lower.timeout_seconds),
        }
    }
}

impl MqttConfig {
    fn from_table(table: &toml::Table) -> Self {
        MqttConfig {
            host: field(table, "mqtt.host"),
            port: field(table, "mqtt.port"),
            username: field(table, "mqtt.username"),
            password: field(table, "mqtt.password"),
            publisher_id: field(table, "mqtt.publisher_id"),
            topic_path: field(table, "mqtt.topic_path"),
            keep_alive_seconds: field(table, "mqtt.keep_alive_seconds"),
        }
    }

    fn merge(self, lower: Self) -> Self {
        MqttConfig {
            host: self.host.or(lower.host),
            port: self.port.or(lower.port),
            username: self.username.or(lower.username),
            password: self.password.or(lower.password),
            publisher_id: self.publisher_id.or(lower.publisher_id),
            topic_path: self.topic_path.or(lower.topic_path),
            keep_alive_seconds: self.keep_alive_seconds.or(lower.keep_alive_seconds),
        }
    }
}

impl CalendarConfig {
    fn from_table(table: &toml::Table) -> Self {
        CalendarConfig {
            events_path: field(table, "calendar.events_path"),
            meeting_markers: field(table, "calendar.meeting_markers"),
        }
    }

    fn merge(self, lower: Self) -> Self {
        CalendarConfig {
            events_path: self.events_path.or(lower.events_path),
            meeting_markers: self.meeting_markers.or(lower.meeting_markers),
        }
    }
}

impl ForegroundConfig {
    fn from_table(table: &toml::Table) -> Self {
        ForegroundConfig {
            command: field(table, "foreground.command"),
        }
    }

    fn merge(self, lower: Self) -> Self {
        ForegroundConfig {
            command: self.command.or(lower.command),
        }
    }
}

/// Settings the presence engine reads. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub control_identity: String,
    pub poll_interval: Duration,
    pub trigger_applications: HashSet<String>,
    pub use_calendar_signal: bool,
    pub debug_force_activity_on_trigger: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        AppConfig::default().engine_config()
    }
}

/// Looks up `path` (`key` or `section.key`). A value of the wrong type is
/// logged and treated as absent.
fn field<T: DeserializeOwned>(table: &toml::Table, path: &str) -> Option<T> {
    let key = path.rsplit_once('.').map_or(path, |(_, key)| key);
    let value = table.get(key)?;
    match value.clone().try_into::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("Ignoring config key `{}`: {}", path, err);
            None
        }
    }
}

fn section<T>(table: &toml::Table, name: &str, from_table: fn(&toml::Table) -> T) -> Option<T> {
    field::<toml::Table>(table, name).map(|section| from_table(&section))
}

fn merge_section<T>(higher: Option<T>, lower: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (higher, lower) {
        (Some(higher), Some(lower)) => Some(merge(higher, lower)),
        (higher, lower) => higher.or(lower),
    }
}

impl AppConfig {
    /// Parses one TOML document. Keys holding the wrong type are dropped
    /// individually instead of rejecting the whole document.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let table: toml::Table = toml::de::from_str(contents)?;
        Ok(AppConfig {
            control_identity: field(&table, "control_identity"),
            poll_interval_seconds: field(&table, "poll_interval_seconds"),
            trigger_applications: field(&table, "trigger_applications"),
            use_calendar_signal: field(&table, "use_calendar_signal"),
            debug_force_activity_on_trigger: field(&table, "debug_force_activity_on_trigger"),
            luxafor: section(&table, "luxafor", LuxaforConfig::from_table),
            mqtt: section(&table, "mqtt", MqttConfig::from_table),
            calendar: section(&table, "calendar", CalendarConfig::from_table),
            foreground: section(&table, "foreground", ForegroundConfig::from_table),
        })
    }

    /// Field-by-field merge where `self` wins over `lower`.
    pub fn merge(self, lower: AppConfig) -> AppConfig {
        AppConfig {
            control_identity: self.control_identity.or(lower.control_identity),
            poll_interval_seconds: self.poll_interval_seconds.or(lower.poll_interval_seconds),
            trigger_applications: self.trigger_applications.or(lower.trigger_applications),
            use_calendar_signal: self.use_calendar_signal.or(lower.use_calendar_signal),
            debug_force_activity_on_trigger: self
                .debug_force_activity_on_trigger
                .or(lower.debug_force_activity_on_trigger),
            luxafor: merge_section(self.luxafor, lower.luxafor, LuxaforConfig::merge),
            mqtt: merge_section(self.mqtt, lower.mqtt, MqttConfig::merge),
            calendar: merge_section(self.calendar, lower.calendar, CalendarConfig::merge),
            foreground: merge_section(self.foreground, lower.foreground, ForegroundConfig::merge),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        let parsed = self
            .poll_interval_seconds
            .map(|secs| (secs, Duration::try_from_secs_f64(secs)));
        match parsed {
            Some((_, Ok(interval))) if !interval.is_zero() => interval,
            Some((secs, _)) => {
                warn!(
                    "Invalid poll_interval_seconds {}, using {}",
                    secs, DEFAULT_POLL_INTERVAL_SECONDS
                );
                Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECONDS)
            }
            None => Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECONDS),
        }
    }

    /// Broker settings when MQTT is configured with a usable host. A `[mqtt]`
    /// section without one disables remote control.
    pub fn mqtt_broker(&self) -> Option<(&str, &MqttConfig)> {
        let mqtt = self.mqtt.as_ref()?;
        match mqtt.host.as_deref() {
            Some(host) => Some((host, mqtt)),
            None => {
                warn!("[mqtt] has no valid host, remote control disabled");
                None
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let trigger_applications = match &self.trigger_applications {
            Some(apps) => apps.iter().cloned().collect(),
            None => DEFAULT_TRIGGER_APPLICATIONS
                .iter()
                .map(|app| app.to_string())
                .collect(),
        };

        EngineConfig {
            control_identity: self
                .control_identity
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTROL_IDENTITY.to_string()),
            poll_interval: self.poll_interval(),
            trigger_applications,
            use_calendar_signal: self.use_calendar_signal.unwrap_or(false),
            debug_force_activity_on_trigger: self.debug_force_activity_on_trigger.unwrap_or(false),
        }
    }
}

/// Reads a single layer. Missing or malformed files yield `None`.
pub fn load_layer(path: &Path) -> Option<AppConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!("No config at {}: {}", path.display(), err);
            return None;
        }
    };

    match AppConfig::parse(&contents) {
        Ok(config) => {
            debug!("Loaded config layer {}", path.display());
            Some(config)
        }
        Err(err) => {
            warn!("Skipping malformed config {}: {}", path.display(), err);
            None
        }
    }
}

/// Layer paths, highest priority first: explicit path, user config dir, bundled
/// file next to the executable.
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Merges every readable layer in priority order. Never fails; the worst case
/// is the built-in defaults.
pub fn resolve(paths: &[PathBuf]) -> AppConfig {
    paths
        .iter()
        .filter_map(|path| load_layer(path))
        .fold(AppConfig::default(), |higher, lower| higher.merge(lower))
}
