/*!
# Tracker Application

Receives the 29-byte frame stream of a pan-tilt-zoom-focus camera-tracking
encoder and publishes calibrated pose and lens telemetry.

## Features

- Serial (38400 8O1 by default) or UDP transport
- Frame resynchronization with device id and checksum validation
- Auto-ranging or manual zoom/focus calibration
- Per-second frame rate with rolling average
- Headless JSON sampler on stdout, with calibration commands on stdin
- GUI with offsets, calibration buttons and a live channel readout

## Usage

### GUI Mode (default)
```bash
tracker
```

### Command Line Mode
```bash
tracker run --port COM3 --device-id 1
```

### Synthetic Frames (no hardware)
```bash
tracker run --debug
```
*/

use std::path::{Path, PathBuf};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracker_core::Axes;

mod capture;
mod config;
mod gui;

use capture::{list_ports, SourceSpec, TrackerCapture};
use config::{AppConfig, TransportKind};
use gui::TrackerGui;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Camera-tracking encoder receiver publishing pose and lens telemetry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "tracker.toml")]
    config: PathBuf,

    /// Run in command-line mode (no GUI)
    #[arg(long)]
    cli: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a stream and print samples as JSON lines
    Run {
        /// Serial port name (selects the serial transport)
        #[arg(short, long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Listen for the stream on this UDP port instead of a serial port
        #[arg(long)]
        udp: Option<u16>,

        /// Expected device id
        #[arg(short, long)]
        device_id: Option<u8>,

        /// Translation offset x,y,z
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        translate: Option<Vec<f64>>,

        /// Rotation offset x,y,z
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        rotate: Option<Vec<f64>>,

        /// Sample interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Replay a recorded byte stream instead of opening a transport
        #[arg(long, conflicts_with = "debug")]
        replay: Option<PathBuf>,

        /// Generate synthetic frames instead of opening a transport
        #[arg(long)]
        debug: bool,
    },

    /// List serial ports
    Ports,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "tracker.toml")]
        output: PathBuf,
    },
}

/// Overrides given on the command line
struct RunOverrides {
    port: Option<String>,
    baud: Option<u32>,
    udp: Option<u16>,
    device_id: Option<u8>,
    translate: Option<Vec<f64>>,
    rotate: Option<Vec<f64>>,
    interval_ms: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(port) = self.port {
            config.transport.kind = TransportKind::Serial;
            config.transport.serial_port = port;
        }
        if let Some(baud) = self.baud {
            config.transport.baud_rate = baud;
        }
        if let Some(udp) = self.udp {
            config.transport.kind = TransportKind::Udp;
            config.transport.udp_port = udp;
        }
        if let Some(device_id) = self.device_id {
            config.tracker.device_id = device_id;
        }
        if let Some(translate) = parse_axes("translate", self.translate)? {
            config.tracker.offsets.translate = translate;
        }
        if let Some(rotate) = parse_axes("rotate", self.rotate)? {
            config.tracker.offsets.rotate = rotate;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.sampler.interval_ms = interval_ms;
        }
        Ok(())
    }
}

fn parse_axes(name: &str, values: Option<Vec<f64>>) -> anyhow::Result<Option<Axes>> {
    let Some(values) = values else {
        return Ok(None);
    };
    let xyz = <[f64; 3]>::try_from(values.as_slice())
        .map_err(|_| anyhow::anyhow!("--{} expects x,y,z, got {} values", name, values.len()))?;
    Ok(Some(xyz.into()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr to keep stdout clean for samples
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Run { port, baud, udp, device_id, translate, rotate, interval_ms, replay, debug }) => {
            let mut config = load_or_default(&cli.config);
            RunOverrides { port, baud, udp, device_id, translate, rotate, interval_ms }.apply(&mut config)?;
            config.tracker.validate()?;

            let source = match (replay, debug) {
                (Some(path), _) => SourceSpec::Replay(path),
                (None, true) => SourceSpec::Synthetic,
                (None, false) => SourceSpec::Configured,
            };
            run_capture(config, source)
        }

        Some(Commands::Ports) => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }

        Some(Commands::Config { output }) => {
            // Generate configuration file
            generate_config_file(output)
        }

        None => {
            if cli.cli {
                // CLI mode with config file
                let config = AppConfig::load_from_file(&cli.config)?;
                info!("Starting capture from config: {}", cli.config.display());
                run_capture(config, SourceSpec::Configured)
            } else {
                // GUI mode
                run_gui(cli.config)
            }
        }
    }
}

fn load_or_default(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::new();
    }
    AppConfig::load_from_file(path).unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {:#}", e);
        AppConfig::new()
    })
}

/// Run the headless capture until Ctrl+C or the end of the source
fn run_capture(config: AppConfig, source: SourceSpec) -> anyhow::Result<()> {
    let mut capture = TrackerCapture::new(config, source);

    // Set up Ctrl+C handler
    let running = capture.get_running_flag();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    capture.start()
}

/// Run the GUI application
fn run_gui(config_path: PathBuf) -> anyhow::Result<()> {
    info!("Starting tracker GUI");

    let config = load_or_default(&config_path);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.gui.window_width, config.gui.window_height])
            .with_title("Camera Tracking Receiver"),
        ..Default::default()
    };

    eframe::run_native(
        "Tracker",
        options,
        Box::new(|cc| {
            Ok(Box::new(TrackerGui::new(config, config_path, cc)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {}", e))?;

    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> anyhow::Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("Generated configuration file: {}", output_path.display());
    println!("Edit the file to customize settings, then run:");
    println!("   tracker --cli --config {}", output_path.display());

    Ok(())
}
