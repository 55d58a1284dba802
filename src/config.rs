//! Session settings, read from JSON and overridden from the command line.
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::{Calibration, SensorError, SensorVariant};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub variant: SensorVariant,
    pub port: String,
    /// Overrides the variant's baud rate.
    pub baud_rate: Option<u32>,
    pub output_data_rate_hz: Option<f64>,
    pub window_seconds: Option<f64>,
    /// Target FFT length; rounded down to a power of two.
    pub fft_size: usize,
    /// One value for every field, or one per field.
    pub sensitivity: Option<Vec<f64>>,
    /// Baseline restored by `clear_offset`, same shape rules as `sensitivity`.
    pub default_offset: Option<Vec<f64>>,
    /// Query the board for calibration / rate before streaming.
    pub readback_calibration: bool,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
}
impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: SensorVariant::NtThreeAxis,
            port: "/dev/ttyUSB0".to_owned(),
            baud_rate: None,
            output_data_rate_hz: None,
            window_seconds: None,
            fft_size: 1024,
            sensitivity: None,
            default_offset: None,
            readback_calibration: true,
            poll_interval_ms: 100,
            read_timeout_ms: 10,
        }
    }
}
impl SessionConfig {
    pub fn for_variant(variant: SensorVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }
    pub fn from_json_str(text: &str) -> Result<Self, SensorError> {
        serde_json::from_str(text).map_err(|e| SensorError::Config(e.to_string()))
    }
    pub fn load(path: &Path) -> Result<Self, SensorError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or_else(|| self.variant.baud_rate())
    }
    pub fn output_data_rate_hz(&self) -> f64 {
        self.output_data_rate_hz
            .unwrap_or_else(|| self.variant.default_output_data_rate_hz())
    }
    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
            .unwrap_or_else(|| self.variant.default_window_seconds())
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    /// Variant defaults with the configured overrides applied.
    pub fn calibration(&self) -> Result<Calibration, SensorError> {
        let mut calibration = self.variant.calibration();
        let fields = calibration.fields();
        if let Some(offset) = &self.default_offset {
            calibration.set_default_offset(&per_field(offset, fields, "default_offset")?);
        }
        if let Some(sensitivity) = &self.sensitivity {
            calibration.set_sensitivity(&per_field(sensitivity, fields, "sensitivity")?)?;
        }
        Ok(calibration)
    }
}
fn per_field(values: &[f64], fields: usize, what: &str) -> Result<Vec<f64>, SensorError> {
    match values.len() {
        1 => Ok(vec![values[0]; fields]),
        n if n == fields => Ok(values.to_vec()),
        n => Err(SensorError::Config(format!(
            "{what} needs 1 or {fields} values, got {n}"
        ))),
    }
}
