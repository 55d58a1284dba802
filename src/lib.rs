//! Decoding, calibration and spectral analysis for AMI magnetic sensor boards
//! streaming ASCII telemetry over a serial link.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod types;

pub use config::SessionConfig;
pub use drivers::{Sample, Sensor, SensorError, SensorReader, SensorVariant, SpectrumResult};
pub use types::{SensorCommand, SensorEvent};
