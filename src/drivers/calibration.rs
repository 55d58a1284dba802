use log::info;

use crate::drivers::SensorError;

/// Cross-axis interference terms reported by the AMI30x evaluation kit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Interference {
    pub xy: f64,
    pub xz: f64,
    pub yx: f64,
    pub yz: f64,
    pub zx: f64,
    pub zy: f64,
}

/// Parameter block returned by the evaluation kit's `cag` command.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceParameters {
    pub fine_output: [f64; 3],
    pub sensitivity: [f64; 3],
    pub interference: Interference,
}
impl DeviceParameters {
    pub const PREFIX: &'static str = "cag|OK:";

    /// Parses `cag|OK:fx,fy,fz,sx,sy,sz,xy,xz,yx,yz,zx,zy`.
    pub fn parse(response: &str) -> Result<Self, SensorError> {
        let v = parse_fields(response.replace(Self::PREFIX, "").as_str(), 12)?;
        Ok(Self {
            fine_output: [v[0], v[1], v[2]],
            sensitivity: [v[3], v[4], v[5]],
            interference: Interference {
                xy: v[6],
                xz: v[7],
                yx: v[8],
                yz: v[9],
                zx: v[10],
                zy: v[11],
            },
        })
    }
}

/// Parses the `mea|x,y,z` single-sample response into raw counts.
pub fn parse_raw_sample(response: &str) -> Result<[f64; 3], SensorError> {
    let v = parse_fields(response.replace("mea|", "").as_str(), 3)?;
    Ok([v[0], v[1], v[2]])
}

fn parse_fields(body: &str, expected: usize) -> Result<Vec<f64>, SensorError> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < expected {
        return Err(SensorError::Readback(format!(
            "expected {expected} fields, got {} in {body:?}",
            fields.len()
        )));
    }
    fields
        .iter()
        .take(expected)
        .map(|f| {
            f.trim()
                .parse::<f64>()
                .map_err(|_| SensorError::Readback(format!("non-numeric field {f:?} in {body:?}")))
        })
        .collect()
}

/// Per-field offset and sensitivity.
///
/// A raw field value becomes a reading by subtracting `bias`, and a reading
/// becomes a calibrated value as `1000 * (reading - offset) / sensitivity`.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    bias: f64,
    default_offset: Vec<f64>,
    offset: Vec<f64>,
    sensitivity: Vec<f64>,
    device: Option<DeviceParameters>,
}
impl Calibration {
    pub fn new(bias: f64, default_offset: Vec<f64>, sensitivity: Vec<f64>) -> Self {
        debug_assert_eq!(default_offset.len(), sensitivity.len());
        Self {
            bias,
            offset: default_offset.clone(),
            default_offset,
            sensitivity,
            device: None,
        }
    }
    /// Same offset and sensitivity on every one of `fields` fields.
    pub fn uniform(fields: usize, bias: f64, default_offset: f64, sensitivity: f64) -> Self {
        Self::new(bias, vec![default_offset; fields], vec![sensitivity; fields])
    }
    pub fn fields(&self) -> usize {
        self.offset.len()
    }
    pub fn offset(&self) -> &[f64] {
        &self.offset
    }
    pub fn sensitivity(&self) -> &[f64] {
        &self.sensitivity
    }
    pub fn device_parameters(&self) -> Option<&DeviceParameters> {
        self.device.as_ref()
    }
    pub fn reading(&self, raw: f64) -> f64 {
        raw - self.bias
    }
    pub fn apply(&self, reading: f64, axis: usize) -> f64 {
        1000.0 * (reading - self.offset[axis]) / self.sensitivity[axis]
    }
    /// Zeroes the output at `latest`.
    pub fn set_offset(&mut self, latest: &[f64]) {
        for (offset, &value) in self.offset.iter_mut().zip(latest) {
            *offset = value;
        }
    }
    pub fn clear_offset(&mut self) {
        self.offset.clone_from(&self.default_offset);
    }
    /// Replaces the baseline `clear_offset` returns to, and applies it.
    pub fn set_default_offset(&mut self, default_offset: &[f64]) {
        for (slot, &value) in self.default_offset.iter_mut().zip(default_offset) {
            *slot = value;
        }
        self.clear_offset();
    }
    pub fn set_sensitivity(&mut self, sensitivity: &[f64]) -> Result<(), SensorError> {
        if let Some(bad) = sensitivity.iter().find(|s| **s == 0.0 || !s.is_finite()) {
            return Err(SensorError::Config(format!("sensitivity {bad} is not usable")));
        }
        for (slot, &value) in self.sensitivity.iter_mut().zip(sensitivity) {
            *slot = value;
        }
        Ok(())
    }
    /// Adopts the sensitivity the device reported and keeps the rest of the block.
    pub fn apply_device_parameters(&mut self, params: DeviceParameters) -> Result<(), SensorError> {
        self.set_sensitivity(&params.sensitivity)?;
        info!(
            "fine output = {:?}, sensitivity = {:?}",
            params.fine_output, params.sensitivity
        );
        self.device = Some(params);
        Ok(())
    }
    /// Uses a raw sample taken at rest as the zero-field offset.
    pub fn apply_raw_offset(&mut self, raw: &[f64]) {
        let readings: Vec<f64> = raw.iter().map(|&r| self.reading(r)).collect();
        self.set_offset(&readings);
        info!("offset = {:?}", self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn scales_to_milli_units() {
        let cal = Calibration::uniform(1, 0.0, 0.0, 4.0);
        assert_eq!(cal.apply(9999.0, 0), 2_499_750.0);
    }
    #[test]
    fn bias_is_removed_before_offset() {
        let mut cal = Calibration::uniform(3, 2048.0, 0.0, 2.0);
        assert_eq!(cal.reading(2050.0), 2.0);
        cal.apply_raw_offset(&[2049.0, 2048.0, 2047.0]);
        assert_eq!(cal.offset(), &[1.0, 0.0, -1.0]);
        assert_eq!(cal.apply(cal.reading(2050.0), 0), 500.0);
    }
    #[test]
    fn clear_then_set_offset_round_trips() {
        let mut cal = Calibration::uniform(3, 0.0, 2.6, 1.0);
        let latest = [2.61, 2.58, 2.7];
        cal.clear_offset();
        cal.set_offset(&latest);
        assert_eq!(cal.offset(), &latest);
        for (axis, &reading) in latest.iter().enumerate() {
            assert_eq!(cal.apply(reading, axis), 0.0);
        }
        cal.clear_offset();
        assert_eq!(cal.offset(), &[2.6, 2.6, 2.6]);
    }
    #[test]
    fn parses_parameter_block() {
        let params =
            DeviceParameters::parse("cag|OK:10,11,12,600,610,620,1,2,3,4,5,6").unwrap();
        assert_eq!(params.fine_output, [10.0, 11.0, 12.0]);
        assert_eq!(params.sensitivity, [600.0, 610.0, 620.0]);
        assert_eq!(params.interference.zy, 6.0);
    }
    #[test]
    fn short_or_garbled_parameter_block_is_rejected() {
        assert!(DeviceParameters::parse("cag|OK:10,11,12").is_err());
        assert!(DeviceParameters::parse("cag|OK:10,11,12,600,x,620,1,2,3,4,5,6").is_err());
        assert!(DeviceParameters::parse("").is_err());
    }
    #[test]
    fn failed_readback_keeps_calibration() {
        let mut cal = Calibration::uniform(3, 2048.0, 0.0, 1.0);
        let before = cal.clone();
        assert!(parse_raw_sample("mea|12,oops").is_err());
        assert_eq!(cal, before);
        cal.apply_raw_offset(&parse_raw_sample("mea|2050,2040,2048").unwrap());
        assert_eq!(cal.offset(), &[2.0, -8.0, 0.0]);
    }
    #[test]
    fn zero_sensitivity_is_refused() {
        let mut cal = Calibration::uniform(3, 0.0, 0.0, 1.0);
        assert!(cal.set_sensitivity(&[1.0, 0.0, 1.0]).is_err());
        assert_eq!(cal.sensitivity(), &[1.0, 1.0, 1.0]);
    }
}
