//! # labctl
//!
//! Builds every instrument declared in a lab configuration, connects them,
//! optionally writes a pulse program to a sequencer and starts it, then
//! disconnects everything.
//!
//! # Usage
//!
//! ```bash
//! # Connect and disconnect everything in the default configuration
//! labctl
//!
//! # Program the first sequencer and start it
//! labctl --config lab.toml --program odmr.toml --start
//!
//! # Pick a sequencer by name, verbose JSON logs
//! labctl -c lab.toml -p odmr.toml --sequencer pb1 -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use lab_common::config::{ConfigLoader, LogLevel};
use lab_common::consts::DEFAULT_CONFIG_PATH;
use lab_common::error::InstrumentError;
use lab_instrument::config::{BusBackend, BusConfig, LabConfig, SequencerBackend, SequencerConfig};
use lab_instrument::program::PulseProgram;
use lab_instrument::registry::{InstrumentId, InstrumentRegistry};
use lab_instrument::resource::{ResourceManager, SimulatedResourceManager, TcpResourceManager};
use lab_instrument::sequencer::{BoxedSequencer, SequencerDriver, SimulatedSequencer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// labctl - lab instrument control
#[derive(Parser, Debug)]
#[command(name = "labctl")]
#[command(version)]
#[command(about = "Connect lab instruments and program pulse sequencers")]
#[command(long_about = None)]
struct Args {
    /// Path to the lab configuration (lab.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Pulse program to write (program.toml)
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// Sequencer to program; defaults to the first one configured
    #[arg(long, requires = "program")]
    sequencer: Option<String>,

    /// Trigger the sequencer after programming
    #[arg(long, requires = "program")]
    start: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("labctl failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = LabConfig::load(&args.config);
    let level = config
        .as_ref()
        .map_or(LogLevel::default(), |c| c.shared.log_level);
    setup_tracing(&args, level)?;
    let config = config?;

    info!(
        service = %config.shared.service_name,
        config = %args.config.display(),
        "labctl v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let sequencer_config = config.sequencer.clone();
    let mut registry = config.build_registry(bus_manager(&config.bus), || {
        sequencer_driver(&sequencer_config)
    })?;

    let outcome = operate(&args, &mut registry);
    let closed = registry.disconnect_all();
    outcome?;
    closed?;

    info!("labctl finished");
    Ok(())
}

/// Connect everything, then run the requested program.
fn operate(args: &Args, registry: &mut InstrumentRegistry) -> Result<(), Box<dyn std::error::Error>> {
    registry.connect_all()?;
    for id in registry.ids() {
        if let Some(device) = registry.get(id) {
            info!(instrument = %device.name(), %id, capability = %device.definition().name(), "Ready");
        }
    }

    let Some(path) = &args.program else {
        return Ok(());
    };
    let program = PulseProgram::load(path)?;
    let id = select_sequencer(registry, args.sequencer.as_deref())?;
    let sequencer = registry
        .get_as_mut::<BoxedSequencer>(id)
        .ok_or_else(|| InstrumentError::State(format!("instrument {id} is not a pulse sequencer")))?;

    let session = program.write_to(sequencer)?;
    info!(
        register = %session.register(),
        instructions = session.instructions().len(),
        program = %path.display(),
        "Program loaded"
    );
    if args.start {
        sequencer.start()?;
    }
    Ok(())
}

fn select_sequencer(registry: &InstrumentRegistry, name: Option<&str>) -> Result<InstrumentId, InstrumentError> {
    match name {
        Some(name) => registry
            .find(name)
            .filter(|id| registry.get_as::<BoxedSequencer>(*id).is_some())
            .ok_or_else(|| InstrumentError::State(format!("no pulse sequencer named \"{name}\""))),
        None => registry
            .ids()
            .into_iter()
            .find(|id| registry.get_as::<BoxedSequencer>(*id).is_some())
            .ok_or_else(|| InstrumentError::State("no pulse sequencer configured".to_string())),
    }
}

fn bus_manager(config: &BusConfig) -> Arc<dyn ResourceManager> {
    match config.backend {
        BusBackend::Simulation => Arc::new(SimulatedResourceManager::new()),
        BusBackend::Tcp => Arc::new(TcpResourceManager::with_timeout(Duration::from_millis(
            config.timeout_ms,
        ))),
    }
}

fn sequencer_driver(config: &SequencerConfig) -> Result<Box<dyn SequencerDriver>, InstrumentError> {
    match config.backend {
        SequencerBackend::Simulation => Ok(Box::new(SimulatedSequencer::new(config.simulated_boards))),
        SequencerBackend::SpinApi => spinapi_driver(),
    }
}

#[cfg(feature = "spinapi")]
fn spinapi_driver() -> Result<Box<dyn SequencerDriver>, InstrumentError> {
    Ok(Box::new(lab_instrument::sequencer::SpinApiDriver::new()))
}

#[cfg(not(feature = "spinapi"))]
fn spinapi_driver() -> Result<Box<dyn SequencerDriver>, InstrumentError> {
    Err(InstrumentError::Unsupported(
        "labctl was built without the spinapi feature".to_string(),
    ))
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, configured: LogLevel) -> Result<(), ParseError> {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::from_default_env().add_directive(level.as_directive().parse()?);

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
