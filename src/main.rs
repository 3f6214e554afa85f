use std::{io, sync::mpsc};

use miette::Result;
use tracing_subscriber::EnvFilter;

use kickmeter::{
    clock::MonotonicClock,
    config::{Config, SourceConfig},
    meter::KickMeter,
    sensor::{self, ChannelSource, SensorSource, TraceSource},
    transport::SocketTransport,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    miette::set_panic_hook();

    let config = Config::locate()?;

    // the device is useless without both ends, so either failing here halts
    let transport = SocketTransport::bind(&config.transport)?;
    let source = open_source(&config.sensor.source)?;

    tracing::info!("calibrating, keep the sensor still");
    let mut meter = KickMeter::start(&config, source, transport, MonotonicClock::new())?;

    tracing::info!("waiting for kicks... (ctrl+c to quit)");
    meter.run()?;

    Ok(())
}

fn open_source(config: &SourceConfig) -> kickmeter::Result<Box<dyn SensorSource>> {
    match config {
        SourceConfig::Stdin => {
            let (tx, rx) = mpsc::channel();
            // detached, it ends with stdin
            let _reader = sensor::spawn_reader(io::BufReader::new(io::stdin()), tx);
            Ok(Box::new(ChannelSource::new(rx)))
        }
        SourceConfig::Trace { path } => Ok(Box::new(TraceSource::open(path)?)),
    }
}
