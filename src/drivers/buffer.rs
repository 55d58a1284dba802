use std::collections::VecDeque;
use crate::drivers::format::{SampleShape, LINE_CHANNELS};
use crate::drivers::SensorError;

// upper bound on what is reserved up front; longer windows grow on demand
const PREALLOCATE: usize = 4096;

/// One calibrated measurement.
#[derive(Clone, Debug, PartialEq)]
pub enum Sample {
    Scalar(f64),
    Vector([f64; 3]),
    /// `[channel][axis]`
    Matrix(Box<[[f64; 3]; LINE_CHANNELS]>),
}
impl Sample {
    /// Builds a sample from calibrated fields laid out as on the wire.
    pub fn from_fields(shape: SampleShape, fields: &[f64]) -> Self {
        let at = |i: usize| fields.get(i).copied().unwrap_or(0.0);
        match shape {
            SampleShape::Scalar => Sample::Scalar(at(0)),
            SampleShape::Vector => Sample::Vector([at(0), at(1), at(2)]),
            SampleShape::Matrix => {
                let mut matrix = Box::new([[0.0; 3]; LINE_CHANNELS]);
                for (ch, row) in matrix.iter_mut().enumerate() {
                    for (axis, value) in row.iter_mut().enumerate() {
                        *value = at(ch * 3 + axis);
                    }
                }
                Sample::Matrix(matrix)
            }
        }
    }
    pub fn shape(&self) -> SampleShape {
        match self {
            Sample::Scalar(_) => SampleShape::Scalar,
            Sample::Vector(_) => SampleShape::Vector,
            Sample::Matrix(_) => SampleShape::Matrix,
        }
    }
    /// Field `index` in wire order (`channel * 3 + axis` for the matrix).
    pub fn field(&self, index: usize) -> Option<f64> {
        match self {
            Sample::Scalar(v) => (index == 0).then_some(*v),
            Sample::Vector(v) => v.get(index).copied(),
            Sample::Matrix(m) => m.get(index / 3).map(|row| row[index % 3]),
        }
    }
    /// `sqrt(x^2 + y^2 + z^2)` of one channel; `|x|` for a scalar.
    pub fn magnitude(&self, channel: usize) -> Option<f64> {
        match self {
            Sample::Scalar(v) => (channel == 0).then(|| v.abs()),
            Sample::Vector(v) => (channel == 0).then(|| norm(v)),
            Sample::Matrix(m) => m.get(channel).map(norm),
        }
    }
}
fn norm(v: &[f64; 3]) -> f64 {
    (v[0].powi(2) + v[1].powi(2) + v[2].powi(2)).sqrt()
}
/// Sliding window of the most recent samples, oldest first.
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    shape: SampleShape,
    output_data_rate_hz: f64,
    window_seconds: f64,
    max_size: usize,
}
impl SampleBuffer {
    pub fn with_window(
        shape: SampleShape,
        output_data_rate_hz: f64,
        window_seconds: f64,
    ) -> Result<Self, SensorError> {
        check_rate(output_data_rate_hz)?;
        check_window(window_seconds)?;
        let max_size = capacity(output_data_rate_hz, window_seconds)
            .ok_or(SensorError::InvalidWindow(window_seconds))?;
        Ok(Self {
            samples: VecDeque::with_capacity(max_size.min(PREALLOCATE)),
            shape,
            output_data_rate_hz,
            window_seconds,
            max_size,
        })
    }
    pub fn shape(&self) -> SampleShape {
        self.shape
    }
    pub fn max_size(&self) -> usize {
        self.max_size
    }
    pub fn output_data_rate_hz(&self) -> f64 {
        self.output_data_rate_hz
    }
    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }
    /// Takes effect on the next push; nothing is trimmed here.
    pub fn set_window_seconds(&mut self, window_seconds: f64) -> Result<(), SensorError> {
        check_window(window_seconds)?;
        self.max_size = capacity(self.output_data_rate_hz, window_seconds)
            .ok_or(SensorError::InvalidWindow(window_seconds))?;
        self.window_seconds = window_seconds;
        Ok(())
    }
    /// Takes effect on the next push; nothing is trimmed here.
    pub fn set_output_data_rate(&mut self, output_data_rate_hz: f64) -> Result<(), SensorError> {
        check_rate(output_data_rate_hz)?;
        self.max_size = capacity(output_data_rate_hz, self.window_seconds)
            .ok_or(SensorError::InvalidOutputDataRate(output_data_rate_hz))?;
        self.output_data_rate_hz = output_data_rate_hz;
        Ok(())
    }
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.max_size {
            self.samples.pop_front();
        }
    }
    pub fn clear(&mut self) {
        self.samples.clear();
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
    /// One field of every buffered sample, oldest first.
    pub fn axis(&self, index: usize) -> Result<Vec<f64>, SensorError> {
        let available = self.shape.field_count();
        if index >= available {
            return Err(SensorError::ChannelOutOfRange {
                channel: index,
                available,
            });
        }
        Ok(self.samples.iter().filter_map(|s| s.field(index)).collect())
    }
    /// Per-sample magnitude of one channel, oldest first.
    pub fn magnitude(&self, channel: usize) -> Result<Vec<f64>, SensorError> {
        let available = self.shape.channel_count();
        if channel >= available {
            return Err(SensorError::ChannelOutOfRange { channel, available });
        }
        Ok(self
            .samples
            .iter()
            .filter_map(|s| s.magnitude(channel))
            .collect())
    }
}
/// `None` when the window holds more samples than can be addressed.
fn capacity(output_data_rate_hz: f64, window_seconds: f64) -> Option<usize> {
    let samples = (output_data_rate_hz * window_seconds).round();
    if samples >= usize::MAX as f64 {
        return None;
    }
    Some((samples as usize).max(1))
}
fn check_rate(output_data_rate_hz: f64) -> Result<(), SensorError> {
    if output_data_rate_hz > 0.0 && output_data_rate_hz.is_finite() {
        Ok(())
    } else {
        Err(SensorError::InvalidOutputDataRate(output_data_rate_hz))
    }
}
fn check_window(window_seconds: f64) -> Result<(), SensorError> {
    if window_seconds > 0.0 && window_seconds.is_finite() {
        Ok(())
    } else {
        Err(SensorError::InvalidWindow(window_seconds))
    }
}
