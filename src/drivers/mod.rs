// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod buffer;
pub mod calibration;
pub mod decoder;
pub mod error;
pub mod fft;
pub mod format;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod variant;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::{Sample, SampleBuffer};
pub use calibration::{Calibration, DeviceParameters, Interference};
pub use decoder::{FrameDecoder, RawFrame};
pub use error::SensorError;
pub use fft::{SpectrumAnalyzer, SpectrumResult};
pub use format::{SampleShape, Terminator, WireFormat};
pub use pipeline::SensorPipeline;
pub use session::{Sensor, SensorReader};
pub use transport::{CommandLink, ManualTransport, SerialTransport, Transport};
pub use variant::SensorVariant;
