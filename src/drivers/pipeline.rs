use crate::drivers::buffer::{Sample, SampleBuffer};
use crate::drivers::calibration::Calibration;
use crate::drivers::decoder::{FrameDecoder, RawFrame};
use crate::drivers::error::SensorError;
use crate::drivers::variant::SensorVariant;
/// Decoder, calibration and sample window of one sensor.
///
/// Bytes go in through [`SensorPipeline::ingest`]; each terminated frame is
/// calibrated field by field and pushed as one [`Sample`]. A field dropped by
/// the decoder keeps its previous calibrated value.
pub struct SensorPipeline {
    variant: SensorVariant,
    decoder: FrameDecoder,
    calibration: Calibration,
    buffer: SampleBuffer,
    latest_reading: Vec<f64>,
    latest_calibrated: Vec<f64>,
}
impl SensorPipeline {
    pub fn new(
        variant: SensorVariant,
        calibration: Calibration,
        output_data_rate_hz: f64,
        window_seconds: f64,
    ) -> Result<Self, SensorError> {
        let format = variant.wire_format();
        if calibration.fields() != format.field_count() {
            return Err(SensorError::Config(format!(
                "{variant} has {} fields, calibration has {}",
                format.field_count(),
                calibration.fields()
            )));
        }
        let buffer = SampleBuffer::with_window(format.shape, output_data_rate_hz, window_seconds)?;
        let latest_reading = calibration.offset().to_vec();
        let latest_calibrated = vec![0.0; format.field_count()];
        Ok(Self {
            variant,
            decoder: FrameDecoder::new(format),
            calibration,
            buffer,
            latest_reading,
            latest_calibrated,
        })
    }
    /// Variant defaults throughout.
    pub fn with_defaults(variant: SensorVariant) -> Result<Self, SensorError> {
        Self::new(
            variant,
            variant.calibration(),
            variant.default_output_data_rate_hz(),
            variant.default_window_seconds(),
        )
    }
    pub fn variant(&self) -> SensorVariant {
        self.variant
    }
    /// Feeds raw bytes and returns how many samples were completed.
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        let frames: Vec<RawFrame> = self.decoder.feed(bytes).collect();
        let completed = frames.len();
        for frame in frames {
            self.publish(frame);
        }
        completed
    }
    fn publish(&mut self, frame: RawFrame) {
        for (axis, raw) in frame.fields.iter().enumerate() {
            if let Some(raw) = *raw {
                let reading = self.calibration.reading(raw);
                self.latest_reading[axis] = reading;
                self.latest_calibrated[axis] = self.calibration.apply(reading, axis);
            }
        }
        let shape = self.buffer.shape();
        self.buffer
            .push(Sample::from_fields(shape, &self.latest_calibrated));
    }
    /// Clears the window, any partially decoded frame and the values a
    /// dropped field would fall back to.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.decoder.reset();
        self.latest_reading = self.calibration.offset().to_vec();
        self.latest_calibrated.iter_mut().for_each(|v| *v = 0.0);
    }
    pub fn set_offset(&mut self) {
        self.calibration.set_offset(&self.latest_reading);
    }
    pub fn clear_offset(&mut self) {
        self.calibration.clear_offset();
    }
    pub fn set_window_seconds(&mut self, window_seconds: f64) -> Result<(), SensorError> {
        self.buffer.set_window_seconds(window_seconds)
    }
    pub fn set_output_data_rate(&mut self, output_data_rate_hz: f64) -> Result<(), SensorError> {
        self.buffer.set_output_data_rate(output_data_rate_hz)
    }
    pub fn output_data_rate_hz(&self) -> f64 {
        self.buffer.output_data_rate_hz()
    }
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }
    /// Bias-corrected raw values of the last decoded frame.
    pub fn latest_reading(&self) -> &[f64] {
        &self.latest_reading
    }
    pub fn malformed_fields(&self) -> u64 {
        self.decoder.malformed_fields()
    }
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
    pub fn latest(&self) -> Option<Sample> {
        self.buffer.latest().cloned()
    }
    pub fn window(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }
    pub fn axis(&self, index: usize) -> Result<Vec<f64>, SensorError> {
        self.buffer.axis(index)
    }
    pub fn magnitude(&self, channel: usize) -> Result<Vec<f64>, SensorError> {
        self.buffer.magnitude(channel)
    }
}
