//! Weather Cube daemon
//!
//! Usage:
//!   weather-cube <config.yaml>
//!
//! Log level follows RUST_LOG (default: info).

use argh::FromArgs;
use std::path::PathBuf;
use tokio::sync::mpsc;
use weather_cube::{
    setup_shutdown, snapshot_channel, status_page, Clock, Config, LocalClock, OpenWeatherClient,
    PollerSettings, PollingLoop, TasmotaMqtt,
};

#[derive(FromArgs)]
/// Show the current weather on a Tasmota LED display
struct Args {
    /// path to the YAML configuration file
    #[argh(positional)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    // validate() has already checked these
    let settings = PollerSettings {
        mapper: config.color_mapper()?,
        hours: config.active_hours()?,
        refresh: config.refresh_interval(),
    };

    log::info!(
        "Starting weather-cube v{} for ({:.4}, {:.4}), device topic '{}'",
        env!("CARGO_PKG_VERSION"),
        config.weather.latitude,
        config.weather.longitude,
        config.mqtt.topic
    );

    // Shutdown on SIGINT/SIGTERM
    let (shutdown_tx, shutdown_rx) = setup_shutdown()?;

    let weather = OpenWeatherClient::new(&config.weather)?;

    let (restart_tx, restart_rx) = mpsc::channel(1);
    let (transport, mqtt_task) =
        TasmotaMqtt::connect(&config.mqtt, restart_tx, shutdown_tx.subscribe());

    let (snapshot_writer, snapshot_reader) = snapshot_channel(LocalClock.now());

    let status_task = if config.status_page.enabled {
        let addr = config.status_bind_addr()?;
        let shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = status_page::run_status_server(snapshot_reader, addr, shutdown).await {
                log::error!("Status page error: {}", e);
            }
        }))
    } else {
        log::info!("Status page disabled");
        None
    };

    let poller = PollingLoop::new(
        settings,
        weather,
        transport,
        LocalClock,
        snapshot_writer,
        restart_rx,
    );

    log::info!("Weather cube running. Press Ctrl+C to exit.");

    // Runs until shutdown
    poller.run(shutdown_rx).await;

    // Closes the MQTT connection
    if let Err(e) = mqtt_task.await {
        log::warn!("MQTT task ended abnormally: {}", e);
    }
    if let Some(task) = status_task {
        if let Err(e) = task.await {
            log::warn!("Status page task ended abnormally: {}", e);
        }
    }

    log::info!("Weather cube stopped.");

    Ok(())
}
