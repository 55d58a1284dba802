use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::drivers::buffer::Sample;
use crate::drivers::calibration::{parse_raw_sample, Calibration, DeviceParameters};
use crate::drivers::error::SensorError;
use crate::drivers::fft::{SpectrumAnalyzer, SpectrumResult};
use crate::drivers::pipeline::SensorPipeline;
use crate::drivers::transport::{CommandLink, Transport};
use crate::drivers::variant::SensorVariant;

const READ_CHUNK: usize = 4096;

type Shared = Arc<RwLock<SensorPipeline>>;

fn read_lock(shared: &Shared) -> RwLockReadGuard<'_, SensorPipeline> {
    shared.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(shared: &Shared) -> RwLockWriteGuard<'_, SensorPipeline> {
    shared.write().unwrap_or_else(PoisonError::into_inner)
}

/// A sensor board on a transport: the producer side of a session.
///
/// Every mutation of the pipeline goes through here. Consumers get a
/// [`SensorReader`] and only ever see whole-frame snapshots.
pub struct Sensor<T: Transport> {
    transport: T,
    variant: SensorVariant,
    readback_calibration: bool,
    streaming: bool,
    pipeline: Shared,
    analyzer: Arc<SpectrumAnalyzer>,
}
impl<T: Transport> Sensor<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Result<Self, SensorError> {
        let pipeline = SensorPipeline::new(
            config.variant,
            config.calibration()?,
            config.output_data_rate_hz(),
            config.window_seconds(),
        )?;
        let analyzer = SpectrumAnalyzer::new(config.fft_size, config.output_data_rate_hz())?;
        Ok(Self {
            transport,
            variant: config.variant,
            readback_calibration: config.readback_calibration,
            streaming: false,
            pipeline: Arc::new(RwLock::new(pipeline)),
            analyzer: Arc::new(analyzer),
        })
    }
    pub fn variant(&self) -> SensorVariant {
        self.variant
    }
    pub fn reader(&self) -> SensorReader {
        SensorReader {
            pipeline: Arc::clone(&self.pipeline),
            analyzer: Arc::clone(&self.analyzer),
        }
    }
    pub fn transport(&self) -> &T {
        &self.transport
    }
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
    /// Resets the session, reads calibration back from the board if
    /// configured, then starts streaming.
    ///
    /// A board that is already streaming would mix its telemetry into the
    /// readback replies, so a repeated start only resends the start command.
    pub fn start(&mut self) -> Result<(), SensorError> {
        write_lock(&self.pipeline).reset();
        if self.readback_calibration && !self.streaming {
            self.read_back();
        }
        let command = self
            .variant
            .start_command(read_lock(&self.pipeline).output_data_rate_hz());
        self.send(&command)?;
        self.streaming = true;
        info!("{}: started with {command:?}", self.variant);
        Ok(())
    }
    pub fn stop(&mut self) -> Result<(), SensorError> {
        let result = self.send(self.variant.stop_command());
        self.streaming = false;
        write_lock(&self.pipeline).reset();
        info!("{}: stopped", self.variant);
        result
    }
    /// Reads what the transport has and feeds it to the decoder.
    pub fn poll(&mut self) -> Result<usize, SensorError> {
        let mut buf = [0u8; READ_CHUNK];
        let len = match self.transport.read(&mut buf) {
            Ok(len) => len,
            Err(SensorError::TransportUnavailable) => 0,
            Err(err) => return Err(err),
        };
        if len == 0 {
            return Ok(0);
        }
        debug!("{}: read {len} bytes", self.variant);
        Ok(self.ingest(&buf[..len]))
    }
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        write_lock(&self.pipeline).ingest(bytes)
    }
    pub fn set_offset(&mut self) {
        write_lock(&self.pipeline).set_offset();
    }
    pub fn clear_offset(&mut self) {
        write_lock(&self.pipeline).clear_offset();
    }
    pub fn set_window_seconds(&mut self, window_seconds: f64) -> Result<(), SensorError> {
        write_lock(&self.pipeline).set_window_seconds(window_seconds)
    }
    /// New rate is used for the buffer size, the spectrum axis and the next
    /// start command.
    pub fn set_output_data_rate(&mut self, output_data_rate_hz: f64) -> Result<(), SensorError> {
        write_lock(&self.pipeline).set_output_data_rate(output_data_rate_hz)
    }
    /// Closed links and unusable commands are logged, not fatal.
    fn send(&mut self, command: &str) -> Result<(), SensorError> {
        match self.transport.send_command(command) {
            Err(err @ (SensorError::TransportUnavailable | SensorError::InvalidEscape(_))) => {
                warn!("{}: {command:?} not sent: {err}", self.variant);
                Ok(())
            }
            other => other,
        }
    }
    fn read_back(&mut self) {
        match self.variant {
            SensorVariant::Ami30xEvk => self.read_back_evk(),
            SensorVariant::NtThreeAxis => self.read_back_rate(),
            _ => {}
        }
    }
    fn read_back_evk(&mut self) {
        // force active mode on the AMI306
        self.transport
            .request_response("act 0", Duration::from_millis(100));
        let reply = self
            .transport
            .request_response("cag", Duration::from_millis(200));
        let params = DeviceParameters::parse(&reply).and_then(|params| {
            write_lock(&self.pipeline)
                .calibration_mut()
                .apply_device_parameters(params)
        });
        if let Err(err) = params {
            warn!("{}: keeping previous sensitivity: {err}", self.variant);
        }
        let reply = self
            .transport
            .request_response("mea", Duration::from_millis(100));
        match parse_raw_sample(&reply) {
            Ok(raw) => write_lock(&self.pipeline)
                .calibration_mut()
                .apply_raw_offset(&raw),
            Err(err) => warn!("{}: keeping previous offset: {err}", self.variant),
        }
    }
    fn read_back_rate(&mut self) {
        let reply = self
            .transport
            .request_response("get odr", Duration::from_millis(100));
        let rate = reply
            .trim()
            .parse::<u32>()
            .map_err(|_| SensorError::Readback(format!("bad rate {reply:?}")))
            .and_then(|odr| self.set_output_data_rate(f64::from(odr)));
        match rate {
            Ok(()) => info!("{}: output data rate {reply} Hz", self.variant),
            Err(err) => warn!("{}: keeping configured rate: {err}", self.variant),
        }
    }
}

/// Read-only view of a sensor's window, safe to use from any thread.
#[derive(Clone)]
pub struct SensorReader {
    pipeline: Shared,
    analyzer: Arc<SpectrumAnalyzer>,
}
impl SensorReader {
    pub fn variant(&self) -> SensorVariant {
        read_lock(&self.pipeline).variant()
    }
    pub fn len(&self) -> usize {
        read_lock(&self.pipeline).buffer().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn max_size(&self) -> usize {
        read_lock(&self.pipeline).buffer().max_size()
    }
    pub fn latest(&self) -> Option<Sample> {
        read_lock(&self.pipeline).latest()
    }
    pub fn window(&self) -> Vec<Sample> {
        read_lock(&self.pipeline).window()
    }
    pub fn axis(&self, index: usize) -> Result<Vec<f64>, SensorError> {
        read_lock(&self.pipeline).axis(index)
    }
    pub fn magnitude(&self, channel: usize) -> Result<Vec<f64>, SensorError> {
        read_lock(&self.pipeline).magnitude(channel)
    }
    pub fn latest_reading(&self) -> Vec<f64> {
        read_lock(&self.pipeline).latest_reading().to_vec()
    }
    pub fn calibration(&self) -> Calibration {
        read_lock(&self.pipeline).calibration().clone()
    }
    pub fn output_data_rate_hz(&self) -> f64 {
        read_lock(&self.pipeline).output_data_rate_hz()
    }
    /// Spectrum of one axis; the lock is released before the transform runs.
    pub fn analyze_spectrum(
        &self,
        axis: usize,
        log_scale: bool,
    ) -> Result<SpectrumResult, SensorError> {
        let (samples, rate) = {
            let pipeline = read_lock(&self.pipeline);
            (pipeline.axis(axis)?, pipeline.output_data_rate_hz())
        };
        self.analyzer
            .with_output_data_rate(rate)?
            .analyze(&samples, log_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::transport::ManualTransport;
    fn config(variant: SensorVariant) -> SessionConfig {
        SessionConfig::for_variant(variant)
    }
    #[test]
    fn start_and_stop_send_variant_commands() {
        let mut sensor = Sensor::new(ManualTransport::new(), &config(SensorVariant::NtScalar)).unwrap();
        sensor.start().unwrap();
        sensor.stop().unwrap();
        assert_eq!(sensor.transport().written(), &["a".to_owned(), "s".to_owned()]);
    }
    #[test]
    fn evk_readback_sets_calibration() {
        let mut link = ManualTransport::new();
        link.reply_to("cag", "cag|OK:1,2,3,600,500,400,0,0,0,0,0,0\r\n");
        link.reply_to("mea", "mea|2058,2038,2048\r\n");
        let mut sensor = Sensor::new(link, &config(SensorVariant::Ami30xEvk)).unwrap();
        sensor.start().unwrap();
        assert_eq!(
            sensor.transport().written(),
            &["act 0".to_owned(), "cag".to_owned(), "mea".to_owned(), "mes 0 10".to_owned()]
        );
        let calibration = sensor.reader().calibration();
        assert_eq!(calibration.sensitivity(), &[600.0, 500.0, 400.0]);
        assert_eq!(calibration.offset(), &[10.0, -10.0, 0.0]);
        assert!(calibration.device_parameters().is_some());
        sensor.ingest(b"2064,2048,2052,\r");
        assert_eq!(sensor.reader().latest(), Some(Sample::Vector([10.0, 20.0, 10.0])));
    }
    #[test]
    fn restart_while_streaming_skips_readback() {
        let mut link = ManualTransport::new();
        link.reply_to("cag", "cag|OK:1,2,3,600,500,400,0,0,0,0,0,0\r\n");
        link.reply_to("mea", "mea|2058,2038,2048\r\n");
        let mut sensor = Sensor::new(link, &config(SensorVariant::Ami30xEvk)).unwrap();
        sensor.start().unwrap();
        assert!(sensor.is_streaming());
        sensor.start().unwrap();
        assert_eq!(sensor.transport().written().len(), 5);
        assert_eq!(sensor.transport().written()[4], "mes 0 10");
        sensor.stop().unwrap();
        assert!(!sensor.is_streaming());
        sensor.start().unwrap();
        assert_eq!(sensor.transport().written()[5], "mes 1");
        assert_eq!(sensor.transport().written()[6], "act 0");
    }
    #[test]
    fn link_dropping_mid_session_is_tolerated() {
        let mut link = ManualTransport::new();
        link.push_incoming("1v");
        let cfg = SessionConfig {
            readback_calibration: false,
            ..config(SensorVariant::NtScalar)
        };
        let mut sensor = Sensor::new(link, &cfg).unwrap();
        sensor.start().unwrap();
        sensor.transport_mut().set_open(false);
        assert_eq!(sensor.poll().unwrap(), 0);
        sensor.stop().unwrap();
        assert_eq!(sensor.transport().written(), &["a".to_owned()]);
    }
    #[test]
    fn failed_readback_keeps_defaults_and_still_starts() {
        let mut link = ManualTransport::new();
        link.reply_to("cag", "cag|NG\r\n");
        let mut sensor = Sensor::new(link, &config(SensorVariant::Ami30xEvk)).unwrap();
        let before = sensor.reader().calibration();
        sensor.start().unwrap();
        assert_eq!(sensor.reader().calibration(), before);
        assert_eq!(sensor.transport().written().last().map(String::as_str), Some("mes 0 10"));
        assert_eq!(sensor.ingest(b"2049,2048,2048,\r"), 1);
    }
    #[test]
    fn three_axis_readback_updates_rate() {
        let mut link = ManualTransport::new();
        link.reply_to("get odr", "50\r\n");
        let mut sensor = Sensor::new(link, &config(SensorVariant::NtThreeAxis)).unwrap();
        sensor.start().unwrap();
        let reader = sensor.reader();
        assert_eq!(reader.output_data_rate_hz(), 50.0);
        assert_eq!(reader.max_size(), 400);
    }
    #[test]
    fn closed_transport_is_tolerated() {
        let mut sensor =
            Sensor::new(ManualTransport::closed(), &config(SensorVariant::Ami30xEvk)).unwrap();
        sensor.start().unwrap();
        assert_eq!(sensor.poll().unwrap(), 0);
        sensor.stop().unwrap();
    }
    #[test]
    fn poll_feeds_decoder_and_start_resets() {
        let mut link = ManualTransport::new();
        link.push_incoming("1v2");
        link.push_incoming("v3v");
        let cfg = SessionConfig {
            readback_calibration: false,
            default_offset: Some(vec![0.0]),
            ..config(SensorVariant::NtScalar)
        };
        let mut sensor = Sensor::new(link, &cfg).unwrap();
        let reader = sensor.reader();
        assert_eq!(sensor.poll().unwrap(), 1);
        assert_eq!(sensor.poll().unwrap(), 2);
        assert_eq!(reader.axis(0).unwrap(), vec![250.0, 500.0, 750.0]);
        sensor.start().unwrap();
        assert!(reader.is_empty());
    }
    #[test]
    fn spectrum_needs_a_full_transform() {
        let cfg = SessionConfig {
            fft_size: 8,
            readback_calibration: false,
            default_offset: Some(vec![0.0]),
            ..config(SensorVariant::NtScalar)
        };
        let mut sensor = Sensor::new(ManualTransport::new(), &cfg).unwrap();
        let reader = sensor.reader();
        sensor.ingest(b"1v0v1v0v");
        assert!(reader.analyze_spectrum(0, false).unwrap_err().is_precondition());
        sensor.ingest(b"1v0v1v0v");
        let spectrum = reader.analyze_spectrum(0, false).unwrap();
        assert_eq!(spectrum.len(), 4);
        assert!((spectrum.frequencies[1] - 250.0 / 8.0).abs() < 1e-9);
        assert!(matches!(
            reader.analyze_spectrum(1, false),
            Err(SensorError::ChannelOutOfRange { channel: 1, available: 1 })
        ));
    }
}
