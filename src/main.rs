use std::path::PathBuf;

use clap::Parser;
use log::{LevelFilter, info};

mod bluez;
mod buzzer;
mod config;
mod identity;
mod manager;
mod messages;
mod probe;
mod radio;
mod reconnect;
mod setup;
mod signals;

/// Buzzes while the paired Bluetooth device is out of range.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Run without buzzer hardware (print messages instead).
    #[arg(long)]
    dry_fire: bool,

    /// TOML file overriding the built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = config::AppConfig::load(cli.config.as_deref())?;
    let timing = config.timing();

    let radio = bluez::BluezCli::new(&config.bluetooth(), timing.command_timeout);
    let store = identity::IdentityStore::new(config.identity_path());
    info!("Identity file: {}", store.path().display());
    let buzzer: Box<dyn buzzer::Buzzer> = if cli.dry_fire {
        info!("Dry fire mode: no buzzer hardware will be touched");
        Box::new(buzzer::DryFireBuzzer)
    } else {
        Box::new(buzzer::GpioBuzzer::new(&config.buzzer()))
    };

    let options = setup::SetupOptions {
        alias: config
            .bluetooth()
            .alias
            .unwrap_or_else(|| "AlarmPi".to_string()),
        discovery_poll: timing.discovery_poll,
        discovery_timeout: timing.discovery_timeout,
    };

    let shutdown = signals::shutdown_signal();
    tokio::pin!(shutdown);

    let identity = tokio::select! {
        _ = &mut shutdown => {
            info!("Stopped before a device was chosen");
            return Ok(());
        }
        identity = setup::prepare(&radio, &store, &options) => identity?,
    };

    manager::Manager::new(radio, buzzer, identity, timing)
        .run_loop(shutdown)
        .await;

    Ok(())
}
