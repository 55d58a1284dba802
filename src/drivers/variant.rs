//! Board variants and their fixed wire/command parameters.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::drivers::calibration::Calibration;
use crate::drivers::format::WireFormat;

/// Idle output of the PIC-based NT board, volts.
pub const NT_PIC_DEFAULT_OFFSET: f64 = 2.36;
/// Idle output of the FTDI-based NT board, volts.
pub const NT_FTDI_DEFAULT_OFFSET: f64 = 0.0;
pub const NT_THREE_AXIS_DEFAULT_OFFSET: f64 = 2.6;
/// Mid-scale of the evaluation kit's 12-bit raw counts.
pub const AMI_RAW_BIAS: f64 = 2048.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorVariant {
    #[serde(rename = "nt-scalar")]
    NtScalar,
    #[serde(rename = "nt-scalar-ftdi")]
    NtScalarFtdi,
    #[serde(rename = "nt-3axis")]
    NtThreeAxis,
    #[serde(rename = "ami30x-evk")]
    Ami30xEvk,
    #[serde(rename = "line-sensor")]
    LineSensor,
}
impl SensorVariant {
    pub const ALL: [SensorVariant; 5] = [
        SensorVariant::NtScalar,
        SensorVariant::NtScalarFtdi,
        SensorVariant::NtThreeAxis,
        SensorVariant::Ami30xEvk,
        SensorVariant::LineSensor,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            SensorVariant::NtScalar => "nt-scalar",
            SensorVariant::NtScalarFtdi => "nt-scalar-ftdi",
            SensorVariant::NtThreeAxis => "nt-3axis",
            SensorVariant::Ami30xEvk => "ami30x-evk",
            SensorVariant::LineSensor => "line-sensor",
        }
    }
    pub fn wire_format(&self) -> WireFormat {
        match self {
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi => WireFormat::nt_scalar(),
            SensorVariant::NtThreeAxis => WireFormat::nt_three_axis(),
            SensorVariant::Ami30xEvk => WireFormat::ami_evk(),
            SensorVariant::LineSensor => WireFormat::line_sensor(),
        }
    }
    pub fn baud_rate(&self) -> u32 {
        match self {
            SensorVariant::LineSensor => 1_250_000,
            _ => 115_200,
        }
    }
    pub fn default_output_data_rate_hz(&self) -> f64 {
        match self {
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi => 250.0,
            SensorVariant::NtThreeAxis => 125.0,
            SensorVariant::Ami30xEvk => 100.0,
            SensorVariant::LineSensor => 5.0,
        }
    }
    pub fn default_window_seconds(&self) -> f64 {
        match self {
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi => 4.0,
            SensorVariant::NtThreeAxis => 8.0,
            SensorVariant::Ami30xEvk | SensorVariant::LineSensor => 10.0,
        }
    }
    pub fn default_offset(&self) -> f64 {
        match self {
            SensorVariant::NtScalar => NT_PIC_DEFAULT_OFFSET,
            SensorVariant::NtScalarFtdi => NT_FTDI_DEFAULT_OFFSET,
            SensorVariant::NtThreeAxis => NT_THREE_AXIS_DEFAULT_OFFSET,
            SensorVariant::Ami30xEvk | SensorVariant::LineSensor => 0.0,
        }
    }
    pub fn default_sensitivity(&self) -> f64 {
        match self {
            // V/uT
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi => 4.0,
            SensorVariant::NtThreeAxis | SensorVariant::Ami30xEvk => 1.0,
            // calibrated value is raw - offset
            SensorVariant::LineSensor => 1000.0,
        }
    }
    pub fn raw_bias(&self) -> f64 {
        match self {
            SensorVariant::Ami30xEvk => AMI_RAW_BIAS,
            _ => 0.0,
        }
    }
    pub fn calibration(&self) -> Calibration {
        Calibration::uniform(
            self.wire_format().field_count(),
            self.raw_bias(),
            self.default_offset(),
            self.default_sensitivity(),
        )
    }
    /// Command that starts streaming at `output_data_rate_hz`.
    pub fn start_command(&self, output_data_rate_hz: f64) -> String {
        match self {
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi | SensorVariant::NtThreeAxis => {
                "a".to_owned()
            }
            SensorVariant::Ami30xEvk => {
                let period_ms = (1000.0 / output_data_rate_hz) as u64;
                format!("mes 0 {period_ms}")
            }
            SensorVariant::LineSensor => "mes 0 200".to_owned(),
        }
    }
    pub fn stop_command(&self) -> &'static str {
        match self {
            SensorVariant::NtScalar | SensorVariant::NtScalarFtdi | SensorVariant::NtThreeAxis => {
                "s"
            }
            SensorVariant::Ami30xEvk | SensorVariant::LineSensor => "mes 1",
        }
    }
}
impl fmt::Display for SensorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for SensorVariant {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorVariant::ALL
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = SensorVariant::ALL.iter().map(|v| v.name()).collect();
                format!("unknown sensor variant {s:?}, expected one of {}", names.join(", "))
            })
    }
}
