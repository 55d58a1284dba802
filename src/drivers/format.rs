/// How a frame ends on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// A single byte, e.g. `\r`, `\n`, `v` or `|`.
    Byte(u8),
    /// `\r`, `\n` or `\r\n`; the pair counts once even when split across feeds.
    CrLf,
}
impl Terminator {
    pub fn matches(&self, byte: u8) -> bool {
        match self {
            Terminator::Byte(b) => *b == byte,
            Terminator::CrLf => byte == b'\r' || byte == b'\n',
        }
    }
}
/// Shape of one calibrated measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleShape {
    Scalar,
    Vector,
    /// 16 channels of 3 axes, channel-major on the wire.
    Matrix,
}
impl SampleShape {
    pub fn field_count(&self) -> usize {
        match self {
            SampleShape::Scalar => 1,
            SampleShape::Vector => 3,
            SampleShape::Matrix => LINE_CHANNELS * 3,
        }
    }
    /// Number of independent 3-axis (or scalar) sensors in one sample.
    pub fn channel_count(&self) -> usize {
        match self {
            SampleShape::Scalar | SampleShape::Vector => 1,
            SampleShape::Matrix => LINE_CHANNELS,
        }
    }
}
pub const LINE_CHANNELS: usize = 16;
/// Immutable description of how raw bytes map to fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireFormat {
    pub name: &'static str,
    pub delimiters: &'static [u8],
    pub terminator: Terminator,
    /// Closes the final field of a frame, ignored anywhere else.
    pub last_field_closer: Option<u8>,
    pub shape: SampleShape,
}
impl WireFormat {
    /// `2.51v2.49v...` from the single-axis NT board.
    pub const fn nt_scalar() -> Self {
        Self {
            name: "nt-scalar",
            delimiters: &[],
            terminator: Terminator::Byte(b'v'),
            last_field_closer: None,
            shape: SampleShape::Scalar,
        }
    }
    /// `x,y,z\r\n` from the NT 3-axis board.
    pub const fn nt_three_axis() -> Self {
        Self {
            name: "nt-3axis",
            delimiters: &[b','],
            terminator: Terminator::CrLf,
            last_field_closer: None,
            shape: SampleShape::Vector,
        }
    }
    /// `x,y,z,\r` from the AMI30x evaluation kit.
    pub const fn ami_evk() -> Self {
        Self {
            name: "ami30x-evk",
            delimiters: &[b','],
            terminator: Terminator::Byte(b'\r'),
            last_field_closer: None,
            shape: SampleShape::Vector,
        }
    }
    /// 48 comma separated values, `\r` after the last one, `|` publishes the snapshot.
    pub const fn line_sensor() -> Self {
        Self {
            name: "line-sensor",
            delimiters: &[b','],
            terminator: Terminator::Byte(b'|'),
            last_field_closer: Some(b'\r'),
            shape: SampleShape::Matrix,
        }
    }
    pub fn field_count(&self) -> usize {
        self.shape.field_count()
    }
    pub fn is_delimiter(&self, byte: u8) -> bool {
        self.delimiters.contains(&byte)
    }
    pub fn is_value_byte(byte: u8) -> bool {
        byte.is_ascii_digit() || byte == b'.' || byte == b'-'
    }
}
