//! CLI entry point for the braille display host controller.
//!
//! Provides a command-line interface for:
//! - Listing serial ports and sending text through the group pipeline
//! - Monitoring raw device telemetry
//! - Offline encoding (pattern bits + actuator angles per character)
//! - Inspecting and updating the persisted settings
//!
//! # Usage
//!
//! Send text to the device, three cells at a time:
//! ```bash
//! braille_host send "hello world" --port /dev/ttyUSB0 --group-size 3
//! ```
//!
//! Watch the device's telemetry stream:
//! ```bash
//! braille_host monitor --port /dev/ttyUSB0
//! ```

use anyhow::Result;
use braille_host::braille;
use braille_host::config::{ConfigStore, DEFAULT_CONFIG_FILE};
use braille_host::servo;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[cfg(feature = "serial")]
use braille_host::pipeline::{CellUpdate, DisplaySink, PipelineController, SendOptions};
#[cfg(feature = "serial")]
use braille_host::telemetry::{self, TelemetryEvent};
#[cfg(feature = "serial")]
use braille_host::transport::{BrailleLink, SerialTransport};
#[cfg(feature = "serial")]
use std::time::Duration;

/// Slack added to `char_delay` before a stalled session is abandoned.
#[cfg(feature = "serial")]
const IDLE_GRACE_MS: u64 = 10_000;

#[derive(Parser)]
#[command(name = "braille_host")]
#[command(about = "Host controller for a serial braille display", long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Send text to the display and follow its progress
    Send {
        /// Text to render
        text: String,

        /// Serial port of the device
        #[arg(long)]
        port: String,

        /// Simultaneously displayed cells (1-7)
        #[arg(long, default_value_t = 1)]
        group_size: usize,

        /// Override the configured character delay (ms)
        #[arg(long)]
        char_delay: Option<u64>,

        /// Override the configured servo delay (ms)
        #[arg(long)]
        servo_delay: Option<u64>,
    },

    /// Connect and print parsed telemetry until interrupted
    Monitor {
        /// Serial port of the device
        #[arg(long)]
        port: String,
    },

    /// Print pattern bits and actuator angles for each character
    Encode {
        /// Text to encode
        text: String,
    },

    /// Show or update the persisted settings
    Config {
        /// KEY=VALUE updates to apply
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Restore defaults
        #[arg(long)]
        reset: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut store = ConfigStore::open(&cli.config)?;
    init_logging(store.settings.debug_mode);

    match cli.command {
        Commands::Ports => cmd_ports(),
        Commands::Send {
            text,
            port,
            group_size,
            char_delay,
            servo_delay,
        } => cmd_send(&store, &text, &port, group_size, char_delay, servo_delay),
        Commands::Monitor { port } => cmd_monitor(&port),
        Commands::Encode { text } => cmd_encode(&text),
        Commands::Config { set, reset } => cmd_config(&mut store, &set, reset),
    }
}

fn init_logging(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

#[cfg(feature = "serial")]
fn cmd_ports() -> Result<()> {
    let ports = SerialTransport::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for port in ports {
            println!("{}", port);
        }
    }
    Ok(())
}

/// Console implementation of the visualization seam: one line per rendered
/// cell, with pattern bits and decoded actuator positions.
#[cfg(feature = "serial")]
struct ConsoleDisplay;

#[cfg(feature = "serial")]
impl DisplaySink for ConsoleDisplay {
    fn cell_update(&mut self, update: CellUpdate) {
        let pattern = update
            .pattern
            .map(|p| p.to_string())
            .unwrap_or_else(|| "------".to_string());
        match update.servo_angles {
            Some((a, b)) => println!(
                "  cell {}: '{}' {}  A {:>5.1} deg ({:.2} mm)  B {:>5.1} deg ({:.2} mm)",
                update.slot + 1,
                update.ch,
                pattern,
                a,
                servo::travel_for_angle(a).1,
                b,
                servo::travel_for_angle(b).1,
            ),
            None => println!("  cell {}: '{}' {}", update.slot + 1, update.ch, pattern),
        }
    }

    fn group_started(&mut self, index: usize, group: &str) {
        println!("Group {}: {}", index + 1, group);
    }

    fn session_complete(&mut self) {
        println!("Transmission complete");
    }
}

#[cfg(feature = "serial")]
fn cmd_send(
    store: &ConfigStore,
    text: &str,
    port: &str,
    group_size: usize,
    char_delay: Option<u64>,
    servo_delay: Option<u64>,
) -> Result<()> {
    let mut settings = store.settings.clone();
    if let Some(ms) = char_delay {
        settings.char_delay = ms;
    }
    if let Some(ms) = servo_delay {
        settings.servo_delay = ms;
    }
    let opts = SendOptions::from_settings(&settings, group_size);

    let mut transport = SerialTransport::new();
    let lines = transport.connect(port)?;

    let mut controller = PipelineController::new(transport, ConsoleDisplay);
    controller.link_mut().send_dual_mode(settings.dual_servo_mode)?;
    controller.submit(text, opts)?;

    let idle_timeout = Duration::from_millis(settings.char_delay + IDLE_GRACE_MS);
    controller.pump(&lines, idle_timeout)?;

    controller.link_mut().disconnect();
    Ok(())
}

#[cfg(feature = "serial")]
fn cmd_monitor(port: &str) -> Result<()> {
    let mut transport = SerialTransport::new();
    let lines = transport.connect(port)?;
    println!("Connected to {}; printing telemetry (Ctrl-C to quit)", port);

    for line in lines {
        match telemetry::parse_line(&line) {
            TelemetryEvent::CharacterRendered {
                ch,
                pattern,
                pulse_a,
                pulse_b,
            } => {
                let pattern = pattern
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "------".to_string());
                let fmt_pulse = |pulse: Option<u32>| match pulse {
                    Some(p) => format!("{} us -> {:.1} deg", p, servo::angle_from_pulse(p)),
                    None => "-".to_string(),
                };
                println!(
                    "'{}' {}  A: {}  B: {}",
                    ch,
                    pattern,
                    fmt_pulse(pulse_a),
                    fmt_pulse(pulse_b)
                );
            }
            TelemetryEvent::Unrecognized { raw } => println!("  {}", raw),
        }
    }

    transport.disconnect();
    Ok(())
}

fn cmd_encode(text: &str) -> Result<()> {
    for (i, c) in text.chars().enumerate() {
        let pattern = braille::pattern_for(c);
        let angles = braille::split_to_angles(pattern);
        println!(
            "{:>3}  '{}'  {}  A {:>5.1} deg ({} us)  B {:>5.1} deg ({} us)",
            i + 1,
            c,
            pattern,
            angles.a,
            servo::pulse_from_angle(angles.a),
            angles.b,
            servo::pulse_from_angle(angles.b),
        );
    }
    Ok(())
}

fn cmd_config(store: &mut ConfigStore, set: &[String], reset: bool) -> Result<()> {
    if reset {
        store.reset_to_defaults()?;
    }
    for entry in set {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{}'", entry))?;
        store.settings.set_key(key.trim(), value.trim())?;
    }
    if !set.is_empty() {
        store.save()?;
    }
    println!("{}", serde_json::to_string_pretty(&store.settings)?);
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn cmd_ports() -> Result<()> {
    anyhow::bail!("Serial support not enabled. Rebuild with --features serial")
}

#[cfg(not(feature = "serial"))]
fn cmd_send(
    _store: &ConfigStore,
    _text: &str,
    _port: &str,
    _group_size: usize,
    _char_delay: Option<u64>,
    _servo_delay: Option<u64>,
) -> Result<()> {
    anyhow::bail!("Serial support not enabled. Rebuild with --features serial")
}

#[cfg(not(feature = "serial"))]
fn cmd_monitor(_port: &str) -> Result<()> {
    anyhow::bail!("Serial support not enabled. Rebuild with --features serial")
}
