// src/main.rs
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use amisensor::drivers::{SerialTransport, SensorReader};
use amisensor::engine::spawn_thread;
use amisensor::{Sensor, SensorCommand, SensorEvent, SensorVariant, SessionConfig};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};

const REPORT_EVERY: Duration = Duration::from_secs(1);

/// Stream an AMI magnetic sensor board and log samples and spectra
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON session configuration; flags below override it
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// nt-scalar, nt-scalar-ftdi, nt-3axis, ami30x-evk or line-sensor
    #[clap(long)]
    variant: Option<SensorVariant>,
    /// Serial device, e.g. /dev/ttyUSB0 or COM4
    #[clap(short, long)]
    port: Option<String>,
    /// Output data rate in Hz
    #[clap(long)]
    odr: Option<f64>,
    /// Sliding window length in seconds
    #[clap(short, long)]
    window: Option<f64>,
    /// Target FFT size, rounded down to a power of two
    #[clap(long)]
    fft_size: Option<usize>,
    /// Skip querying the board for calibration before streaming
    #[clap(long)]
    no_readback: bool,
    /// Field to analyse (channel * 3 + axis for the line sensor)
    #[clap(short, long, default_value_t = 0)]
    axis: usize,
    /// Report spectra on log/log axes
    #[clap(long)]
    log_scale: bool,
    /// Zero the output on the first samples received
    #[clap(long)]
    zero: bool,
    /// Seconds to stream before stopping
    #[clap(short, long, default_value = "10", value_parser = valid_duration)]
    duration: Duration,
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

fn valid_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("bad duration {s:?}: {e}"))
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(variant) = args.variant {
        config.variant = variant;
    }
    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if args.odr.is_some() {
        config.output_data_rate_hz = args.odr;
    }
    if args.window.is_some() {
        config.window_seconds = args.window;
    }
    if let Some(fft_size) = args.fft_size {
        config.fft_size = fft_size;
    }
    if args.no_readback {
        config.readback_calibration = false;
    }
    Ok(config)
}

fn report_spectrum(reader: &SensorReader, axis: usize, log_scale: bool) {
    match reader.analyze_spectrum(axis, log_scale) {
        Ok(spectrum) => {
            if let Some(peak) = spectrum.peak_bin() {
                info!(
                    "axis {axis}: peak level {:.2} at {:.2}{}",
                    spectrum.levels[peak],
                    spectrum.frequencies[peak],
                    if log_scale { " (log)" } else { " Hz" }
                );
            }
        }
        Err(e) if e.is_precondition() => debug!("spectrum not ready: {e}"),
        Err(e) => warn!("spectrum failed: {e}"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let config = build_config(&args)?;
    let mut transport = SerialTransport::new(&config.port, config.baud_rate(), config.read_timeout());
    transport
        .open()
        .with_context(|| format!("failed to open {}", transport.path()))?;
    let sensor = Sensor::new(transport, &config).context("invalid session configuration")?;
    let reader = sensor.reader();

    let (tx, rx) = mpsc::channel();
    let (tx_cmd, rx_cmd) = mpsc::channel();
    let worker = spawn_thread(sensor, config.poll_interval(), tx, rx_cmd);
    tx_cmd.send(SensorCommand::Start)?;

    // too far out to represent means no deadline
    let deadline = Instant::now().checked_add(args.duration);
    let mut last_report = Instant::now();
    let mut zeroed = !args.zero;
    while deadline.map_or(true, |deadline| Instant::now() < deadline) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(SensorEvent::DataReady(n)) => {
                if !zeroed {
                    tx_cmd.send(SensorCommand::SetOffset)?;
                    zeroed = true;
                }
                if let Some(sample) = reader.latest() {
                    debug!("{n} new samples, latest {sample:?}");
                }
            }
            Ok(SensorEvent::Error(e)) => warn!("{e}"),
            Ok(event) => info!("{event:?}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_report.elapsed() >= REPORT_EVERY {
            last_report = Instant::now();
            info!("{} / {} samples buffered", reader.len(), reader.max_size());
            report_spectrum(&reader, args.axis, args.log_scale);
        }
    }

    tx_cmd.send(SensorCommand::Stop).ok();
    tx_cmd.send(SensorCommand::Shutdown).ok();
    let mut sensor = worker
        .join()
        .map_err(|_| anyhow!("sensor thread panicked"))?;
    sensor.transport_mut().close();
    Ok(())
}
