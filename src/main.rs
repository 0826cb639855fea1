use clap::{Parser, Subcommand};
use comm_port_engine::config::{Config, ConfigLoader};
use comm_port_engine::device::MockCommServer;
use comm_port_engine::engine::{CommEngine, OpenMode, PortEngine};
use comm_port_engine::logging;
use comm_port_engine::rates::RATE_TABLE;
use comm_port_engine::readiness::{ReadinessRequest, WaitTimeout};
use comm_port_engine::settings::{to_native, NativeSettings};
use serde_json::json;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "comm-engine",
    version,
    about = "Exclusive-open serial port engine with settings restore and readiness polling.",
    long_about = "Inspect the supported rate table, validate engine configuration, or drive the engine end to end against a simulated comm server."
)]
struct Args {
    /// Configuration file (defaults to the standard resolution order)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the standard baud rates and their native codes.
    Rates {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check the configuration and print the resolved settings as JSON.
    Validate,
    /// Open, configure, signal, wait and close against a simulated device.
    Simulate {
        /// Device location (overrides the configured one)
        #[arg(short, long)]
        location: Option<String>,
        /// Readiness timeout in milliseconds; negative waits indefinitely
        #[arg(short, long, allow_hyphen_values = true)]
        timeout_ms: Option<i64>,
        /// Bytes the simulated far end sends
        #[arg(short, long, default_value = "hello")]
        payload: String,
        /// Delay before the far end sends, in milliseconds
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ConfigLoader, Box<dyn std::error::Error>> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Rates { json } => print_rates(json)?,
        Command::Validate => {
            let loader = load_config(args.config.as_ref())?;
            validate(loader.config())?;
        }
        Command::Simulate {
            location,
            timeout_ms,
            payload,
            delay_ms,
        } => {
            let mut loader = load_config(args.config.as_ref())?;
            let config = loader.config_mut();
            logging::init(&config.logging)?;
            if let Some(location) = location {
                config.port.location = location;
            }
            if let Some(ms) = timeout_ms {
                config.readiness.default_timeout_ms = ms;
            }
            simulate(config, payload.as_bytes(), Duration::from_millis(delay_ms))?;
        }
    }

    Ok(())
}

fn print_rates(as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let entries: Vec<_> = RATE_TABLE
            .iter()
            .map(|entry| json!({ "rate": entry.rate, "token": entry.token.0 }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{:>10}  {:>5}", "rate", "code");
        for entry in RATE_TABLE {
            println!("{:>10}  {:>5}", entry.rate, entry.token.0);
        }
    }
    Ok(())
}

fn validate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let line = config.port.configuration()?;
    let native = to_native(&line)?;

    let report = json!({
        "location": config.port.location,
        "options": config.port.port_options(),
        "configuration": line,
        "native": {
            "rate": native.rate.0,
            "data_bits": native.data_bits.0,
            "parity": native.parity.0,
            "stop_bits": native.stop_bits.0,
            "handshake": native.handshake.bits(),
        },
        "readiness_timeout": config.readiness.default_timeout(),
        "logging": config.logging,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn simulate(
    config: &Config,
    payload: &[u8],
    delay: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let location = config.port.location.as_str();
    let line = config.port.configuration()?;

    let server = MockCommServer::new();
    let device = server.add_device(location, NativeSettings::default());
    let mut engine = CommEngine::with_mock(&server, config.port.port_options());
    engine.set_error_observer(|kind| warn!(%kind, "Engine reported an error"));

    engine.open(location, OpenMode::ReadWrite)?;
    engine.apply_configuration(&line)?;
    engine.set_dtr(true)?;
    engine.set_rts(true)?;
    let lines = engine.lines();
    info!(?lines, "Signals raised");

    let far_end = device.clone();
    let data = payload.to_vec();
    let feeder = thread::spawn(move || {
        thread::sleep(delay);
        far_end.inject_read(&data);
    });

    let timeout = config.readiness.default_timeout();
    let outcome = engine.wait_for_readiness(ReadinessRequest::read(timeout))?;
    feeder.join().map_err(|_| "simulated far end panicked")?;

    let mut received = Vec::new();
    if outcome.read_ready {
        let mut buf = vec![0u8; payload.len().max(1)];
        let n = engine.read(&mut buf)?;
        received.extend_from_slice(&buf[..n]);
        engine.write(&received)?;
        let drained = engine.wait_for_readiness(ReadinessRequest::write(WaitTimeout::Finite(
            Duration::from_millis(100),
        )))?;
        info!(?drained, "Echoed payload");
    }

    engine.set_dtr(false)?;
    engine.close();

    let report = json!({
        "location": location,
        "configuration": line,
        "lines": lines,
        "outcome": outcome,
        "received": String::from_utf8_lossy(&received),
        "restored": device.config() == NativeSettings::default(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
