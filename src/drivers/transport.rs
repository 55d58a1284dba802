use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::drivers::SensorError;

/// Appended to every command sent to a board.
pub const TRANSMIT_TERMINATOR: &str = "\r";
const RESPONSE_BUFFER: usize = 256;

/// Byte link to a sensor board.
pub trait Transport: Send {
    fn is_open(&self) -> bool;
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError>;
    /// Reads whatever is available; `Ok(0)` when nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SensorError>;
}

/// Command helpers available on every [`Transport`].
pub trait CommandLink: Transport {
    /// Sends `command` (backslash escapes expanded) followed by `\r`.
    fn send_command(&mut self, command: &str) -> Result<(), SensorError> {
        let bytes = encode_command(command)?;
        debug!("-> {:?}", String::from_utf8_lossy(&bytes));
        self.write(&bytes)
    }
    /// Sends `command`, waits `wait`, and returns the reply without trailing
    /// line endings. Empty if the link is closed or anything fails.
    fn request_response(&mut self, command: &str, wait: Duration) -> String {
        if !self.is_open() {
            return String::new();
        }
        let mut buf = [0u8; RESPONSE_BUFFER];
        // stale input would be mistaken for the reply
        if let Err(err) = self.read(&mut buf) {
            trace!("drain before {command:?}: {err}");
        }
        if let Err(err) = self.send_command(command) {
            warn!("sending {command:?} failed: {err}");
            return String::new();
        }
        thread::sleep(wait);
        match self.read(&mut buf) {
            Ok(len) => {
                let reply = String::from_utf8_lossy(&buf[..len])
                    .trim_end_matches(|c: char| c == '\r' || c == '\n')
                    .to_owned();
                debug!("<- {reply:?}");
                reply
            }
            Err(err) => {
                warn!("no response to {command:?}: {err}");
                String::new()
            }
        }
    }
}
impl<T: Transport + ?Sized> CommandLink for T {}

/// Expands escapes and appends the transmit terminator.
pub fn encode_command(command: &str) -> Result<Vec<u8>, SensorError> {
    let mut text = unescape_command(command)?;
    text.push_str(TRANSMIT_TERMINATOR);
    Ok(text.into_bytes())
}

/// Expands `\\ \' \" \r \n \t \b \f \uXXXX`. Unknown escapes yield the
/// escaped character; a trailing lone backslash is kept.
pub fn unescape_command(command: &str) -> Result<String, SensorError> {
    let mut out = String::with_capacity(command.len());
    let mut chars = command.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| SensorError::InvalidEscape(command.to_owned()))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
        }
    }
    Ok(out)
}

/// Serial port transport, 8N1 without flow control.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}
impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
            port: None,
        }
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn open(&mut self) -> Result<(), SensorError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open()?;
        info!("opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("closed {}", self.path);
        }
    }
}
impl Transport for SerialTransport {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        let port = self.port.as_mut().ok_or(SensorError::TransportUnavailable)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
        let port = self.port.as_mut().ok_or(SensorError::TransportUnavailable)?;
        match port.read(buf) {
            Ok(len) => Ok(len),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory transport with scripted replies, for tests and playback.
#[derive(Default)]
pub struct ManualTransport {
    open: bool,
    incoming: VecDeque<Vec<u8>>,
    replies: HashMap<String, Vec<u8>>,
    written: Vec<String>,
}
impl ManualTransport {
    pub fn new() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }
    pub fn closed() -> Self {
        Self::default()
    }
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }
    /// Queues bytes for a later `read`.
    pub fn push_incoming(&mut self, bytes: impl Into<Vec<u8>>) {
        self.incoming.push_back(bytes.into());
    }
    /// Queues `reply` whenever `command` is written.
    pub fn reply_to(&mut self, command: &str, reply: impl Into<Vec<u8>>) {
        self.replies.insert(command.to_owned(), reply.into());
    }
    /// Commands written so far, without the transmit terminator.
    pub fn written(&self) -> &[String] {
        &self.written
    }
}
impl Transport for ManualTransport {
    fn is_open(&self) -> bool {
        self.open
    }
    fn write(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        if !self.open {
            return Err(SensorError::TransportUnavailable);
        }
        let text = String::from_utf8_lossy(bytes);
        let command = text.strip_suffix(TRANSMIT_TERMINATOR).unwrap_or(&*text).to_owned();
        if let Some(reply) = self.replies.get(&command) {
            self.incoming.push_back(reply.clone());
        }
        self.written.push(command);
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
        if !self.open {
            return Err(SensorError::TransportUnavailable);
        }
        let Some(mut chunk) = self.incoming.pop_front() else {
            return Ok(0);
        };
        let len = chunk.len().min(buf.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        if len < chunk.len() {
            self.incoming.push_front(chunk.split_off(len));
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn escapes_are_expanded() {
        assert_eq!(unescape_command(r"mes 0 10").unwrap(), "mes 0 10");
        assert_eq!(unescape_command(r"a\r\nb\tc").unwrap(), "a\r\nb\tc");
        assert_eq!(unescape_command(r#"\\ \' \""#).unwrap(), "\\ ' \"");
        assert_eq!(unescape_command(r"A\q").unwrap(), "Aq");
        assert_eq!(unescape_command("end\\").unwrap(), "end\\");
        assert!(unescape_command(r"\u00G1").is_err());
        assert!(unescape_command(r"\u12").is_err());
    }
    #[test]
    fn commands_get_carriage_return() {
        assert_eq!(encode_command("get odr").unwrap(), b"get odr\r");
    }
    #[test]
    fn request_response_strips_line_endings() {
        let mut link = ManualTransport::new();
        link.reply_to("get odr", "125\r\n");
        assert_eq!(link.request_response("get odr", Duration::ZERO), "125");
        assert_eq!(link.written(), &["get odr".to_owned()]);
    }
    #[test]
    fn request_response_discards_stale_input() {
        let mut link = ManualTransport::new();
        link.push_incoming("1,2,3\r");
        link.reply_to("cag", "cag|OK:1\r");
        assert_eq!(link.request_response("cag", Duration::ZERO), "cag|OK:1");
    }
    #[test]
    fn closed_link_yields_empty_response() {
        let mut link = ManualTransport::closed();
        link.reply_to("get odr", "125");
        assert_eq!(link.request_response("get odr", Duration::ZERO), "");
        assert!(link.written().is_empty());
        assert!(matches!(
            link.read(&mut [0u8; 4]),
            Err(SensorError::TransportUnavailable)
        ));
    }
    #[test]
    fn invalid_escape_sends_nothing() {
        let mut link = ManualTransport::new();
        assert_eq!(link.request_response(r"\uZZZZ", Duration::ZERO), "");
        assert!(link.written().is_empty());
    }
    #[test]
    fn reads_split_large_chunks() {
        let mut link = ManualTransport::new();
        link.push_incoming("abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }
}
