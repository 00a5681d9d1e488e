//! CLI Entry Point for scope-ctl
//!
//! Provides command-line access to a SCPI oscilloscope:
//! - Reading and writing subsystem settings
//! - Capturing a waveform to CSV
//! - Autoscale and software trigger
//!
//! # Usage
//!
//! ```bash
//! scope-ctl --resource TCPIP0::192.168.0.17::5025::SOCKET idn
//! scope-ctl --mock settings trigger --json
//! scope-ctl --mock set channel1 scale 0.5
//! scope-ctl --mock capture --channel channel2 --output trace.csv --volts
//! ```
//!
//! Without `--resource`, the configured resource is tried first; if it cannot
//! be opened the user picks one of `instrument.candidates` on stdin.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scope_daq::config::ScopeConfig;
use scope_daq::session::{open_with_fallback, MockSession, Session};
use scope_daq::{tracing_init, ChannelId, Oscilloscope, ScopeOptions};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scope-ctl")]
#[command(about = "Control a SCPI oscilloscope", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Instrument resource, overriding the configuration
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Talk to the simulated oscilloscope
    #[arg(long, global = true)]
    mock: bool,

    /// Log every command and result
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the instrument identification string
    Idn,

    /// Read every setting of one subsystem, or of all of them
    Settings {
        /// trigger, timebase, waveform or channel1..channel4
        subsystem: Option<String>,

        /// Print JSON instead of aligned text
        #[arg(long)]
        json: bool,
    },

    /// Write one setting
    Set {
        /// trigger, timebase, waveform or channel1..channel4
        subsystem: String,
        /// Writable field, e.g. `scale` or `edge:source`
        field: String,
        /// New value
        value: String,
    },

    /// Capture one waveform
    Capture {
        /// Source channel
        #[arg(long, default_value = "channel1")]
        channel: String,

        /// CSV output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Convert codes to volts and seconds using the preamble
        #[arg(long)]
        volts: bool,
    },

    /// Run the instrument's autoscale
    Autoscale,

    /// Issue a software trigger
    ForceTrigger,
}

fn load_config(cli: &Cli) -> Result<ScopeConfig> {
    let mut config = match &cli.config {
        Some(path) => ScopeConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScopeConfig::load().context("Failed to load configuration")?,
    };
    if let Some(resource) = &cli.resource {
        config.instrument.resource = Some(resource.clone());
    }
    if cli.mock {
        config.instrument.mock = true;
    }
    if cli.verbose {
        config.instrument.verbose = true;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn connect(config: &ScopeConfig) -> Result<Oscilloscope> {
    let session: Box<dyn Session> = if config.instrument.mock {
        Box::new(MockSession::new())
    } else {
        let stdin = io::stdin();
        open_with_fallback(
            config.instrument.resource.as_deref(),
            &config.instrument.candidates,
            config.instrument.timeout,
            stdin.lock(),
            io::stderr(),
            config.capture.max_selection_attempts,
        )
        .context("Could not open an instrument session")?
    };
    let scope = Oscilloscope::new(session, ScopeOptions::from(config))
        .context("Failed to initialise oscilloscope")?;
    Ok(scope)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing_init::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let mut scope = connect(&config)?;
    let result = run(&mut scope, cli.command);
    if let Err(e) = scope.close() {
        tracing::warn!("Failed to close instrument session: {}", e);
    }
    result
}

fn run(scope: &mut Oscilloscope, command: Commands) -> Result<()> {
    match command {
        Commands::Idn => {
            println!("{}", scope.identify()?);
        }
        Commands::Settings { subsystem, json } => print_settings(scope, subsystem, json)?,
        Commands::Set {
            subsystem,
            field,
            value,
        } => {
            scope
                .subsystem(&subsystem)?
                .set_field(&field, &value, true)
                .with_context(|| format!("Failed to set {subsystem} {field}"))?;
            println!("✅ {subsystem} {field} = {value}");
        }
        Commands::Capture {
            channel,
            output,
            volts,
        } => capture(scope, &channel, output, volts)?,
        Commands::Autoscale => {
            scope.autoscale()?;
            println!("✅ Autoscale complete");
        }
        Commands::ForceTrigger => {
            scope.force_trigger()?;
            println!("✅ Trigger forced");
        }
    }
    Ok(())
}

fn print_settings(scope: &mut Oscilloscope, subsystem: Option<String>, json: bool) -> Result<()> {
    let mut report = BTreeMap::new();
    match subsystem {
        Some(name) => {
            let ns = scope.subsystem(&name)?;
            report.insert(ns.prefix().to_string(), ns.refresh_state(false)?.clone());
        }
        None => {
            for ns in scope.subsystems()? {
                report.insert(ns.prefix().to_string(), ns.refresh_state(false)?.clone());
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for (prefix, state) in &report {
        println!(":{prefix}");
        let width = state.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, value) in state.iter() {
            println!("  {name:<width$}  {value}");
        }
    }
    Ok(())
}

fn capture(
    scope: &mut Oscilloscope,
    channel: &str,
    output: Option<PathBuf>,
    volts: bool,
) -> Result<()> {
    let id: ChannelId = channel.parse()?;
    let sink: Box<dyn io::Write> = match &output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let samples = if volts {
        let trace = scope.capture_trace(channel)?;
        let len = trace.len();
        scope_daq::export::write_trace_csv(&trace, sink)?;
        len
    } else {
        let samples = scope.capture_waveform(channel)?;
        scope_daq::export::write_samples_csv(id, &samples, sink)?;
        samples.len()
    };

    if let Some(path) = output {
        eprintln!("📊 {samples} samples from {channel} written to {}", path.display());
    }
    Ok(())
}
