use thiserror::Error;
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("spectrum needs {required} samples, only {actual} buffered")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("channel {channel} out of range, sample has {available} channels")]
    ChannelOutOfRange { channel: usize, available: usize },
    #[error("fft size must be at least 1")]
    InvalidFftSize,
    #[error("output data rate must be greater than zero, got {0}")]
    InvalidOutputDataRate(f64),
    #[error("window length must be greater than zero, got {0} s")]
    InvalidWindow(f64),
    #[error("transport is not open")]
    TransportUnavailable,
    #[error("calibration readback failed: {0}")]
    Readback(String),
    #[error("invalid escape sequence in command {0:?}")]
    InvalidEscape(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
impl SensorError {
    /// Errors the caller asked for by violating an API precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SensorError::InsufficientSamples { .. } | SensorError::ChannelOutOfRange { .. }
        )
    }
}
