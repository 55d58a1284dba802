use std::mem;
use std::slice;

use log::warn;

use crate::drivers::format::{Terminator, WireFormat};

/// Longest numeral kept for one field; anything longer is dropped unparsed.
pub const MAX_FIELD_LEN: usize = 32;

/// Numeric fields of one terminated frame. `None` marks a field whose text
/// failed to parse.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub fields: Vec<Option<f64>>,
}
impl RawFrame {
    /// All fields, if none was dropped.
    pub fn values(&self) -> Option<Vec<f64>> {
        self.fields.iter().copied().collect()
    }
}

/// Incremental ASCII frame decoder.
///
/// Bytes may arrive in chunks of any size; partial fields, partial frames and
/// a `\r` whose matching `\n` lands in the next chunk are carried between
/// calls to [`FrameDecoder::feed`].
pub struct FrameDecoder {
    format: WireFormat,
    text: String,
    field: usize,
    staging: Vec<Option<f64>>,
    after_cr: bool,
    overflow: bool,
    malformed: u64,
}
impl FrameDecoder {
    pub fn new(format: WireFormat) -> Self {
        let staging = vec![None; format.field_count()];
        Self {
            format,
            text: String::new(),
            field: 0,
            staging,
            after_cr: false,
            overflow: false,
            malformed: 0,
        }
    }
    /// Total number of fields dropped because their text did not parse.
    pub fn malformed_fields(&self) -> u64 {
        self.malformed
    }
    /// Forgets any partially received field or frame.
    pub fn reset(&mut self) {
        self.text.clear();
        self.field = 0;
        self.after_cr = false;
        self.overflow = false;
        self.staging.iter_mut().for_each(|f| *f = None);
    }
    /// Decodes `bytes`, yielding each frame as its terminator is reached.
    ///
    /// The returned iterator must be drained for all of `bytes` to be consumed.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            bytes: bytes.iter(),
        }
    }
    fn step(&mut self, byte: u8) -> Option<RawFrame> {
        if mem::take(&mut self.after_cr) && byte == b'\n' {
            return None;
        }
        if WireFormat::is_value_byte(byte) {
            self.push_value_byte(byte);
            None
        } else if self.format.is_delimiter(byte) || self.closes_last_field(byte) {
            self.close_field();
            None
        } else if self.format.terminator.matches(byte) {
            if self.format.terminator == Terminator::CrLf && byte == b'\r' {
                self.after_cr = true;
            }
            self.finish_frame()
        } else {
            None
        }
    }
    fn closes_last_field(&self, byte: u8) -> bool {
        self.format.last_field_closer == Some(byte) && self.field + 1 == self.staging.len()
    }
    fn push_value_byte(&mut self, byte: u8) {
        if self.overflow {
            return;
        }
        if self.text.len() < MAX_FIELD_LEN {
            self.text.push(byte as char);
            return;
        }
        self.overflow = true;
        self.malformed += 1;
        warn!(
            "{}: field {} longer than {MAX_FIELD_LEN} bytes, dropping it",
            self.format.name, self.field
        );
        self.text.clear();
    }
    fn close_field(&mut self) {
        let text = mem::take(&mut self.text);
        if mem::take(&mut self.overflow) {
            self.field = (self.field + 1) % self.staging.len();
            return;
        }
        match text.parse::<f64>() {
            Ok(value) => self.staging[self.field] = Some(value),
            Err(_) => {
                self.malformed += 1;
                warn!(
                    "{}: dropping malformed field {} ({:?})",
                    self.format.name, self.field, text
                );
            }
        }
        self.field = (self.field + 1) % self.staging.len();
    }
    fn finish_frame(&mut self) -> Option<RawFrame> {
        if !self.text.is_empty() || self.overflow || self.field != 0 {
            self.close_field();
        }
        self.field = 0;
        self.text.clear();
        let fields = mem::replace(&mut self.staging, vec![None; self.format.field_count()]);
        if fields.iter().all(Option::is_none) {
            return None;
        }
        Some(RawFrame { fields })
    }
}

/// Frames completed by one [`FrameDecoder::feed`] call.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    bytes: slice::Iter<'a, u8>,
}
impl Iterator for Frames<'_> {
    type Item = RawFrame;
    fn next(&mut self) -> Option<RawFrame> {
        for &byte in self.bytes.by_ref() {
            if let Some(frame) = self.decoder.step(byte) {
                return Some(frame);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn decode_all(format: WireFormat, chunks: &[&str]) -> Vec<RawFrame> {
        let mut decoder = FrameDecoder::new(format);
        chunks
            .iter()
            .flat_map(|chunk| decoder.feed(chunk.as_bytes()).collect::<Vec<_>>())
            .collect()
    }

    #[test]
    fn decodes_comma_cr_frame() {
        let frames = decode_all(WireFormat::ami_evk(), &["12,34,56\r"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].values(), Some(vec![12.0, 34.0, 56.0]));
    }

    #[test]
    fn field_split_across_feeds_is_reassembled() {
        let frames = decode_all(WireFormat::ami_evk(), &["12,3", "4,56\r"]);
        assert_eq!(frames, decode_all(WireFormat::ami_evk(), &["12,34,56\r"]));
    }

    #[test]
    fn trailing_delimiter_before_terminator_is_not_an_extra_field() {
        let mut decoder = FrameDecoder::new(WireFormat::ami_evk());
        let frames: Vec<_> = decoder.feed(b"2050,2046,2100,\r").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].values(), Some(vec![2050.0, 2046.0, 2100.0]));
        assert_eq!(decoder.malformed_fields(), 0);
    }

    #[test]
    fn scalar_v_terminated_frames() {
        let frames = decode_all(WireFormat::nt_scalar(), &["2.36v-0.5", "1v9999v"]);
        let values: Vec<_> = frames.iter().map(|f| f.fields[0]).collect();
        assert_eq!(values, vec![Some(2.36), Some(-0.51), Some(9999.0)]);
    }

    #[test]
    fn malformed_field_keeps_indices_aligned() {
        let mut decoder = FrameDecoder::new(WireFormat::ami_evk());
        let frames: Vec<_> = decoder.feed(b"ab,12,34\r").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].fields, vec![None, Some(12.0), Some(34.0)]);
        assert_eq!(decoder.malformed_fields(), 1);
        let next: Vec<_> = decoder.feed(b"1,2,3\r").collect();
        assert_eq!(next[0].values(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn unparseable_numeral_is_dropped() {
        let mut decoder = FrameDecoder::new(WireFormat::ami_evk());
        let frames: Vec<_> = decoder.feed(b"1.2.3,4,5\r").collect();
        assert_eq!(frames[0].fields, vec![None, Some(4.0), Some(5.0)]);
    }

    #[test]
    fn frame_with_no_good_field_is_not_emitted() {
        let frames = decode_all(WireFormat::nt_scalar(), &["v--v", "1v"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].fields, vec![Some(1.0)]);
    }

    #[test]
    fn crlf_pair_counts_once_even_when_split() {
        let joined = decode_all(WireFormat::nt_three_axis(), &["1,2,3\r\n4,5,6\r\n"]);
        let split = decode_all(WireFormat::nt_three_axis(), &["1,2,3\r", "\n4,5,6\r", "\n"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined, split);
    }

    #[test]
    fn bare_lf_and_bare_cr_both_terminate() {
        let frames = decode_all(WireFormat::nt_three_axis(), &["1,2,3\n4,5,6\r7,8,9\r\n"]);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].values(), Some(vec![7.0, 8.0, 9.0]));
    }

    #[test]
    fn line_sensor_snapshot_published_at_pipe() {
        let values: Vec<String> = (0..48).map(|i| (i * 10 - 100).to_string()).collect();
        let body = format!("{}\r", values.join(","));
        let mut decoder = FrameDecoder::new(WireFormat::line_sensor());
        assert_eq!(decoder.feed(body.as_bytes()).count(), 0);
        let frames: Vec<_> = decoder.feed(b"|").collect();
        assert_eq!(frames.len(), 1);
        let fields = frames[0].values().unwrap();
        assert_eq!(fields.len(), 48);
        assert_eq!(fields[0], -100.0);
        assert_eq!(fields[47], 370.0);
    }

    #[test]
    fn line_sensor_ignores_cr_before_last_field() {
        let mut decoder = FrameDecoder::new(WireFormat::line_sensor());
        let frames: Vec<_> = decoder.feed(b"1\r,2,3|").collect();
        assert_eq!(frames[0].fields[0], Some(1.0));
        assert_eq!(frames[0].fields[1], Some(2.0));
        assert_eq!(frames[0].fields[2], Some(3.0));
        assert_eq!(decoder.malformed_fields(), 0);
    }

    #[test]
    fn runaway_field_is_bounded_and_dropped() {
        // three-axis telemetry read with the scalar format has no `v` at all
        let mut decoder = FrameDecoder::new(WireFormat::nt_scalar());
        let stream = "2.51,2.49,2.50\r\n".repeat(4096);
        for _ in 0..8 {
            assert_eq!(decoder.feed(stream.as_bytes()).count(), 0);
            assert!(decoder.text.len() <= MAX_FIELD_LEN);
        }
        assert_eq!(decoder.malformed_fields(), 1);
        assert_eq!(decoder.feed(b"v").count(), 0);
        let frames: Vec<_> = decoder.feed(b"1.5v").collect();
        assert_eq!(frames[0].fields, vec![Some(1.5)]);
        assert_eq!(decoder.malformed_fields(), 1);
    }

    #[test]
    fn overlong_field_keeps_later_fields_aligned() {
        let mut decoder = FrameDecoder::new(WireFormat::ami_evk());
        let long = "9".repeat(MAX_FIELD_LEN + 1);
        let input = format!("{long},12,34\r");
        let frames: Vec<_> = decoder.feed(input.as_bytes()).collect();
        assert_eq!(frames[0].fields, vec![None, Some(12.0), Some(34.0)]);
        let exact = "1".repeat(MAX_FIELD_LEN);
        let input = format!("{exact},1,2\r");
        let frames: Vec<_> = decoder.feed(input.as_bytes()).collect();
        assert!(frames[0].fields[0].is_some());
    }

    #[test]
    fn reset_discards_partial_state() {
        let mut decoder = FrameDecoder::new(WireFormat::ami_evk());
        assert_eq!(decoder.feed(b"99,8").count(), 0);
        decoder.reset();
        let frames: Vec<_> = decoder.feed(b"1,2,3\r").collect();
        assert_eq!(frames[0].values(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn arbitrary_chunking_gives_same_frames() {
        let stream =
            "1.5,-2,3\r\n4,5,6\r\nxx7,8,9\r\n-0.25,1e,2\n\r\n10,11,12\r13,14,15\r\n";
        let whole = decode_all(WireFormat::nt_three_axis(), &[stream]);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let mut chunks = Vec::new();
            let mut rest = stream;
            while !rest.is_empty() {
                let take = rng.gen_range(1..=rest.len().min(7));
                let (head, tail) = rest.split_at(take);
                chunks.push(head);
                rest = tail;
            }
            assert_eq!(decode_all(WireFormat::nt_three_axis(), &chunks), whole);
        }
    }
}
