//! Line framing and record decoding for the ThinkGear JSON stream.
//!
//! Everything here is pure and synchronous: [`LineAccumulator`] turns socket
//! reads of arbitrary size into complete lines, and [`decode_line`] turns one
//! line into a validated [`Sample`].
//!
//! | Input | Result |
//! |---|---|
//! | empty / whitespace-only line | `Ok(None)` (ignored) |
//! | well-formed record | `Ok(Some(sample))` |
//! | not a JSON object of the expected shape | `Err(DecodeError::Malformed)` |
//! | value outside its documented range | `Err(DecodeError::OutOfRange)` |
//! | line longer than the accumulator limit | [`Frame::Overflow`] |

use crate::error::DecodeError;
use crate::protocol::{LINE_TERMINATOR, MAX_BLINK_STRENGTH, MAX_ESENSE, MAX_POOR_SIGNAL_LEVEL};
use crate::types::Sample;

// ── Record decoding ──────────────────────────────────────────────────────────

/// Decode one line of the stream.
///
/// Leading and trailing ASCII whitespace (including the bridge's `\r`) is
/// ignored.  A blank line is not an error: it returns `Ok(None)`.
///
/// ```
/// # use thinkgear_rs::parse::decode_line;
/// let s = decode_line(br#"{"poorSignalLevel":0,"rawEeg":-12}"#).unwrap().unwrap();
/// assert_eq!(s.raw_eeg, Some(-12));
/// assert!(s.esense.is_none());
/// assert!(decode_line(b"  \r").unwrap().is_none());
/// ```
pub fn decode_line(line: &[u8]) -> Result<Option<Sample>, DecodeError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let sample: Sample = serde_json::from_slice(line)?;
    validate(&sample)?;
    Ok(Some(sample))
}

/// Re-encode a sample in the wire format.  Absent groups are omitted, so a
/// decoded line round-trips to an equivalent record.
pub fn encode_sample(sample: &Sample) -> serde_json::Result<String> {
    serde_json::to_string(sample)
}

/// Reject values the sensor never produces.
fn validate(sample: &Sample) -> Result<(), DecodeError> {
    if let Some(level) = sample.poor_signal_level {
        check_range("poorSignalLevel", level, MAX_POOR_SIGNAL_LEVEL)?;
    }
    if let Some(esense) = sample.esense {
        check_range("eSense.attention", esense.attention, MAX_ESENSE)?;
        check_range("eSense.meditation", esense.meditation, MAX_ESENSE)?;
    }
    if let Some(strength) = sample.blink_strength {
        check_range("blinkStrength", strength, MAX_BLINK_STRENGTH)?;
    }
    Ok(())
}

fn check_range(field: &'static str, value: u8, max: u8) -> Result<(), DecodeError> {
    if value > max {
        return Err(DecodeError::OutOfRange {
            field,
            value: value as u32,
            max: max as u32,
        });
    }
    Ok(())
}

// ── Line framing ─────────────────────────────────────────────────────────────

/// One unit produced by [`LineAccumulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped.
    Line(Vec<u8>),
    /// A line that exceeded the limit; carries its length in bytes.  Its
    /// content has already been discarded.
    Overflow(usize),
}

/// Incrementally splits socket reads into `\n`-terminated lines.
///
/// TCP delivers the stream in arbitrary chunks, so a record may be split
/// across several reads or several records may share one read.  The
/// accumulator buffers the unterminated tail between calls.
///
/// ```
/// # use thinkgear_rs::parse::{Frame, LineAccumulator};
/// let mut acc = LineAccumulator::new(1024);
/// assert!(acc.push(br#"{"rawEeg":"#).is_empty());           // incomplete
/// let frames = acc.push(b"7}\r\n{\"rawEeg\":8}\r\n");
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[0], Frame::Line(b"{\"rawEeg\":7}\r".to_vec()));
/// ```
///
/// A line longer than `max_line` is not kept in memory: the accumulator
/// drops bytes until the next terminator and then yields
/// [`Frame::Overflow`] in the line's place.
pub struct LineAccumulator {
    buffer: Vec<u8>,
    max_line: usize,
    /// Length of the line being discarded, `0` when not overflowing.
    overflow: usize,
}

impl LineAccumulator {
    /// Create an empty accumulator that keeps lines of up to `max_line` bytes.
    pub fn new(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            overflow: 0,
        }
    }

    /// Feed one read's worth of bytes and return every line it completed.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(pos) = chunk.iter().position(|&b| b == LINE_TERMINATOR) {
            self.extend(&chunk[..pos]);
            frames.push(self.take_frame());
            chunk = &chunk[pos + 1..];
        }
        self.extend(chunk);
        frames
    }

    /// Flush an unterminated final line at end of stream.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() && self.overflow == 0 {
            return None;
        }
        Some(self.take_frame())
    }

    /// Bytes currently buffered for the incomplete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn extend(&mut self, segment: &[u8]) {
        if self.overflow > 0 {
            self.overflow += segment.len();
        } else if self.buffer.len() + segment.len() > self.max_line {
            self.overflow = self.buffer.len() + segment.len();
            self.buffer.clear();
        } else {
            self.buffer.extend_from_slice(segment);
        }
    }

    fn take_frame(&mut self) -> Frame {
        if self.overflow > 0 {
            let len = std::mem::take(&mut self.overflow);
            Frame::Overflow(len)
        } else {
            Frame::Line(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ESense, EegPower};

    const FULL: &str = r#"{"poorSignalLevel":0,"eSense":{"attention":70,"meditation":50},"eegPower":{"delta":1000,"theta":200,"lowAlpha":30,"highAlpha":40,"lowBeta":50,"highBeta":60,"lowGamma":70,"highGamma":80,"midGamma":5000}}"#;

    #[test]
    fn blank_lines_are_ignored() {
        assert!(decode_line(b"").unwrap().is_none());
        assert!(decode_line(b"   \t").unwrap().is_none());
        assert!(decode_line(b"\r").unwrap().is_none());
    }

    #[test]
    fn full_record() {
        let s = decode_line(FULL.as_bytes()).unwrap().unwrap();
        assert_eq!(s.poor_signal_level, Some(0));
        assert_eq!(
            s.esense,
            Some(ESense {
                attention: 70,
                meditation: 50
            })
        );
        let p = s.eeg_power.unwrap();
        assert_eq!(p.delta, 1000);
        assert_eq!(p.high_gamma, 80);
        assert_eq!(p.mid_gamma, 5000);
        assert!(s.raw_eeg.is_none());
    }

    #[test]
    fn trailing_carriage_return_is_tolerated() {
        let line = format!("{FULL}\r");
        assert!(decode_line(line.as_bytes()).unwrap().is_some());
    }

    #[test]
    fn missing_groups_stay_absent() {
        let s = decode_line(br#"{"poorSignalLevel":26}"#).unwrap().unwrap();
        assert_eq!(s.poor_signal_level, Some(26));
        assert!(s.esense.is_none());
        assert!(s.eeg_power.is_none());
        assert!(s.blink_strength.is_none());
    }

    #[test]
    fn raw_only_line() {
        let s = decode_line(br#"{"rawEeg":-321}"#).unwrap().unwrap();
        assert_eq!(s.raw_eeg, Some(-321));
        assert!(s.poor_signal_level.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let s = decode_line(br#"{"status":"scanning","poorSignalLevel":200}"#)
            .unwrap()
            .unwrap();
        assert_eq!(s.poor_signal_level, Some(200));
    }

    #[test]
    fn mid_gamma_defaults_to_zero() {
        let s = decode_line(
            br#"{"eegPower":{"delta":1,"theta":2,"lowAlpha":3,"highAlpha":4,"lowBeta":5,"highBeta":6,"lowGamma":7,"highGamma":8}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(s.eeg_power.map(|p| p.mid_gamma), Some(0));
        assert_eq!(s.eeg_power.map(|p| p.bands()), Some([1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn garbled_lines_are_malformed() {
        for bad in [
            &b"{\"poorSignalLevel\":0"[..],
            b"not json",
            b"[1,2,3]",
            b"{\"rawEeg\":\"high\"}",
            b"\xff\xfe{}",
        ] {
            assert!(
                matches!(decode_line(bad), Err(DecodeError::Malformed(_))),
                "{:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = decode_line(br#"{"poorSignalLevel":201}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRange {
                field: "poorSignalLevel",
                value: 201,
                max: 200
            }
        ));
        let err = decode_line(br#"{"eSense":{"attention":101,"meditation":0}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { field: "eSense.attention", .. }));
    }

    #[test]
    fn blink_strength_is_range_checked() {
        let s = decode_line(br#"{"blinkStrength":100}"#).unwrap().unwrap();
        assert_eq!(s.blink_strength, Some(100));
        let err = decode_line(br#"{"blinkStrength":101}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRange {
                field: "blinkStrength",
                value: 101,
                max: 100
            }
        ));
    }

    #[test]
    fn reencoding_preserves_present_fields() {
        let s = decode_line(FULL.as_bytes()).unwrap().unwrap();
        let encoded = encode_sample(&s).unwrap();
        assert!(!encoded.contains("rawEeg"));
        assert!(encoded.contains("\"eSense\""));
        assert_eq!(decode_line(encoded.as_bytes()).unwrap(), Some(s));

        let raw = Sample {
            raw_eeg: Some(5),
            ..Default::default()
        };
        assert_eq!(encode_sample(&raw).unwrap(), r#"{"rawEeg":5}"#);
    }

    #[test]
    fn bands_exclude_mid_gamma() {
        let p = EegPower {
            mid_gamma: 99,
            ..Default::default()
        };
        assert!(!p.bands().contains(&99));
    }

    #[test]
    fn accumulator_reassembles_split_lines() {
        let mut acc = LineAccumulator::new(1024);
        assert!(acc.push(b"{\"rawEeg\"").is_empty());
        assert!(acc.push(b":42").is_empty());
        assert_eq!(acc.pending(), 12);
        let frames = acc.push(b"}\n{\"rawEeg\":1}\n{\"raw");
        assert_eq!(
            frames,
            vec![
                Frame::Line(b"{\"rawEeg\":42}".to_vec()),
                Frame::Line(b"{\"rawEeg\":1}".to_vec()),
            ]
        );
        assert_eq!(acc.finish(), Some(Frame::Line(b"{\"raw".to_vec())));
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn accumulator_yields_empty_lines() {
        let mut acc = LineAccumulator::new(16);
        assert_eq!(acc.push(b"\n\n"), vec![Frame::Line(vec![]), Frame::Line(vec![])]);
    }

    #[test]
    fn accumulator_drops_overlong_lines_and_recovers() {
        let mut acc = LineAccumulator::new(8);
        assert!(acc.push(b"0123456").is_empty());
        assert!(acc.push(b"789abc").is_empty());
        assert_eq!(acc.pending(), 0);
        let frames = acc.push(b"def\nok\n");
        assert_eq!(frames, vec![Frame::Overflow(16), Frame::Line(b"ok".to_vec())]);
    }
}
