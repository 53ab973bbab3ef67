use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use log::{info, warn};

mod config;
mod controller;
mod engine;
mod manager;
mod messages;
mod mqtt;
mod signals;

use controller::{DeviceController, LogController, LuxaforClient};
use engine::PresenceEngine;
use messages::PresenceState;
use signals::{
    CalendarSignal, CommandForegroundApp, EventFileCalendar, NullSignal, ProcDeviceActivity,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ForceArg {
    Active,
    Inactive,
}

impl From<ForceArg> for PresenceState {
    fn from(arg: ForceArg) -> Self {
        match arg {
            ForceArg::Active => PresenceState::Active,
            ForceArg::Inactive => PresenceState::Inactive,
        }
    }
}

/// Turns a Luxafor light red while you are in a meeting.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file taking priority over the user and bundled config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log light commands instead of calling the Luxafor webhook
    #[arg(long)]
    dry_run: bool,

    /// Start with presence pinned to this state
    #[arg(long, value_enum)]
    force: Option<ForceArg>,

    /// Run a single tick, print the resulting state and exit
    #[arg(long)]
    once: bool,
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn build_calendar(config: &config::AppConfig) -> anyhow::Result<Box<dyn CalendarSignal>> {
    if config.use_calendar_signal != Some(true) {
        return Ok(Box::new(NullSignal));
    }
    let calendar = config.calendar.clone().unwrap_or_default();
    match calendar.events_path {
        Some(path) => Ok(Box::new(
            EventFileCalendar::new(path, calendar.meeting_markers)
                .context("building calendar marker pattern")?,
        )),
        None => {
            warn!("use_calendar_signal is set but [calendar] events_path is missing");
            Ok(Box::new(NullSignal))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let paths = config::search_paths(args.config.as_deref());
    let app_config = config::resolve(&paths);
    let engine_config = app_config.engine_config();
    info!(
        "Watching {} trigger applications (calendar: {})",
        engine_config.trigger_applications.len(),
        engine_config.use_calendar_signal
    );

    let controller: Box<dyn DeviceController> = if args.dry_run || args.once {
        Box::new(LogController)
    } else {
        Box::new(
            LuxaforClient::new(app_config.luxafor.as_ref(), tokio::runtime::Handle::current())
                .context("building Luxafor client")?,
        )
    };

    let foreground = CommandForegroundApp::new(
        app_config.foreground.clone().and_then(|f| f.command),
        engine_config.poll_interval,
    );

    let mut engine = PresenceEngine::new(
        engine_config,
        Box::new(ProcDeviceActivity::default()),
        Box::new(foreground),
        build_calendar(&app_config)?,
        controller,
    );

    if args.once {
        engine.tick();
        println!("{}", engine.state());
        return Ok(());
    }

    let mqtt = app_config
        .mqtt_broker()
        .map(|(host, broker)| mqtt::MqttClient::new(host, broker));
    match &mqtt {
        Some((client, _)) => {
            let client = client.clone();
            let identity = engine.config().control_identity.clone();
            engine.set_observer(move |state| client.announce_state(state, &identity));
        }
        None => engine.set_observer(|state| info!("Presence is now {}", state)),
    }

    if let Some(state) = args.force {
        engine.force(state.into());
    }

    let core = manager::Manager::new(engine, mqtt);
    core.run_loop().await?;

    Ok(())
}
