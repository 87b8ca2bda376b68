//! Desktop simulator for the envlog temperature/humidity logger.
//!
//! Runs the complete envlog-core engine on a host: a synthetic sensor stands
//! in for the SHT40, a directory (or RAM) for the SD card, the host clock for
//! the NTP servers, and a TCP listener serves the control surface.
//!
//! # Environment
//!
//! | Variable           | Meaning                                              |
//! |--------------------|------------------------------------------------------|
//! | `ENVLOG_DATA_DIR`  | Directory used as the SD card (RAM when unset)       |
//! | `ENVLOG_HTTP_PORT` | Control surface port (default 8080)                  |
//! | `ENVLOG_CONFIG`    | JSON file overriding [`Config`] fields               |
//! | `RUST_LOG`         | `env_logger` filter (default `info`)                 |
//!
//! Try `curl localhost:8080/getreading`, `/getlog` and `/clearlog`.

mod net;
mod sensor;
mod storage;

use std::env;

use chrono::Utc;
use envlog_core::app_state::LoggerContext;
use envlog_core::config::{Config, TimeSyncConfig};
use envlog_core::reading::Timestamp;
use envlog_core::storage::{LogVolume, MediumSwitch, RamVolume, StorageMedium};
use envlog_core::time_sync::WallClock;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use sensor::SyntheticSensor;
use storage::{DirMedium, DirVolume};

/// Port 80 needs elevated privileges on most hosts.
const DEFAULT_HTTP_PORT: u16 = 8080;

fn load_config() -> Config<'static> {
    let Some(path) = env::var_os("ENVLOG_CONFIG") else {
        return Config::default();
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to read config {:?}, using defaults: {}", path, e);
            return Config::default();
        }
    };

    // The configuration borrows its strings and lives as long as the process
    let text: &'static str = Box::leak(text.into_boxed_str());
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!("Invalid config {:?}, using defaults: {}", path, e);
        Config::default()
    })
}

fn http_port() -> u16 {
    match env::var("ENVLOG_HTTP_PORT") {
        Ok(port) => port.parse().unwrap_or_else(|_| {
            warn!("Invalid ENVLOG_HTTP_PORT {:?}, using {}", port, DEFAULT_HTTP_PORT);
            DEFAULT_HTTP_PORT
        }),
        Err(_) => DEFAULT_HTTP_PORT,
    }
}

/// The host clock plays the part of the NTP servers.
async fn host_time_sync<V, M>(context: &LoggerContext<'_, V, M>, config: TimeSyncConfig<'_>) -> !
where
    V: LogVolume,
    M: StorageMedium,
{
    let refresh = std::time::Duration::from_secs(config.refresh_interval_secs);
    if !config.force_sync_at_wake_up {
        tokio::time::sleep(refresh).await;
    }

    loop {
        context.on_time_synchronized(Timestamp::from_naive(Utc::now().naive_utc()));
        tokio::time::sleep(refresh).await;
    }
}

async fn run<V, M>(volume: V, medium: M, config: Config<'static>, port: u16)
where
    V: LogVolume + 'static,
    M: StorageMedium + 'static,
{
    let clock: &'static WallClock = Box::leak(Box::new(WallClock::new()));
    let context: &'static LoggerContext<'static, V, M> =
        Box::leak(Box::new(LoggerContext::new(volume, medium, clock, config.logger)));

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind control surface port");

    // One simulated sensor step per logging period
    let sensor = SyntheticSensor::new(config.logger.sample_interval_secs as f64);
    let mut sampler = context.sampler(sensor);
    let scheduler = context.scheduler();

    LocalSet::new()
        .run_until(async {
            tokio::join!(
                sampler.run(),
                scheduler.run(),
                host_time_sync(context, config.time_sync),
                net::serve(listener, context),
            );
        })
        .await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting envlog simulator");

    let config = load_config();
    let port = http_port();

    match env::var_os("ENVLOG_DATA_DIR") {
        Some(dir) => {
            info!("Using {:?} as the SD card", dir);
            run(DirVolume::new(&dir), DirMedium::new(&dir), config, port).await;
        }
        None => {
            info!("ENVLOG_DATA_DIR not set, logging to RAM");
            run(RamVolume::new(), MediumSwitch::new(true), config, port).await;
        }
    }
}
