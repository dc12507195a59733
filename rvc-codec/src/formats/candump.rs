//! candump / cansend text capture parser
//!
//! Accepts the line shapes produced by SocketCAN's `candump` and consumed by
//! `cansend`:
//!
//! ```text
//! can0 19FEDA9C#01FFC8FCFF04FFFF
//! (1700000000.123456) can0 19FEDA9C#01FFC8FCFF04FFFF
//!   can0  19FEDA9C   [8]  01 FF C8 FC FF 04 FF FF
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use super::CaptureParser;
use crate::frame::{CanFrame, CanId};
use crate::types::{CodecError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Parser for candump text captures
pub struct CandumpParser;

impl CandumpParser {
    /// Parse one capture line
    ///
    /// Returns `Ok(None)` for blank and comment lines.
    pub fn parse_line(line: &str) -> Result<Option<CanFrame>> {
        let mut rest = line.trim();
        if rest.is_empty() || rest.starts_with('#') {
            return Ok(None);
        }

        let mut timestamp_ns = None;
        if let Some(stripped) = rest.strip_prefix('(') {
            let close = stripped
                .find(')')
                .ok_or_else(|| malformed(line, "unterminated timestamp"))?;
            timestamp_ns = Some(parse_timestamp(&stripped[..close]).ok_or_else(|| {
                malformed(line, "invalid timestamp")
            })?);
            rest = stripped[close + 1..].trim_start();
        }

        let mut tokens = rest.split_whitespace();
        let interface = tokens
            .next()
            .ok_or_else(|| malformed(line, "missing interface"))?;
        let frame_token = tokens
            .next()
            .ok_or_else(|| malformed(line, "missing CAN ID"))?;

        let (id_hex, data) = match frame_token.split_once('#') {
            Some((id_hex, data_hex)) => (id_hex, parse_compact_data(line, data_hex)?),
            None => (frame_token, parse_spaced_data(line, tokens)?),
        };

        let raw_id = u32::from_str_radix(id_hex, 16)
            .map_err(|_| malformed(line, "CAN ID is not hex"))?;
        let id = CanId::from_raw(raw_id)?;

        let mut frame = CanFrame::new(interface, id, data);
        frame.timestamp_ns = timestamp_ns;
        Ok(Some(frame))
    }

    /// Iterate the frames of any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> CandumpFrameIterator<R> {
        CandumpFrameIterator {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

/// Frame iterator over a capture file on disk
pub type CandumpFileIterator = CandumpFrameIterator<BufReader<File>>;

impl CaptureParser for CandumpFileIterator {
    fn parse(path: &Path) -> Result<Self> {
        log::info!("Opening capture file: {:?}", path);
        let file = File::open(path)?;
        Ok(CandumpParser::from_reader(BufReader::new(file)))
    }
}

/// Iterator over the frames of a candump capture
pub struct CandumpFrameIterator<R: BufRead> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> Iterator for CandumpFrameIterator<R> {
    type Item = Result<CanFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;

            match CandumpParser::parse_line(&line) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue,
                Err(CodecError::InvalidPayload(msg)) => {
                    return Some(Err(CodecError::InvalidPayload(format!(
                        "line {}: {}",
                        self.line_number, msg
                    ))))
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn malformed(line: &str, reason: &str) -> CodecError {
    CodecError::InvalidPayload(format!("{} in capture line {:?}", reason, line.trim()))
}

/// `seconds.fraction` to nanoseconds
fn parse_timestamp(text: &str) -> Option<u64> {
    let (secs, frac) = match text.trim().split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (text.trim(), ""),
    };
    let secs: u64 = secs.parse().ok()?;
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos: u64 = digits.parse().ok()?;
    secs.checked_mul(1_000_000_000)?.checked_add(nanos)
}

/// Data after `#`: contiguous hex, optionally dot-separated; `R` marks a remote frame
fn parse_compact_data(line: &str, hex: &str) -> Result<Vec<u8>> {
    if hex.starts_with('R') || hex.starts_with('r') {
        return Ok(Vec::new());
    }
    let digits: String = hex.chars().filter(|c| *c != '.').collect();
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed(line, "payload is not hex"));
    }
    if digits.len() % 2 != 0 || digits.len() > 16 {
        return Err(malformed(line, "bad payload length"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| malformed(line, "payload is not hex"))
        })
        .collect()
}

/// Data after `[n]`: `n` space-separated hex bytes
fn parse_spaced_data<'a>(line: &str, mut tokens: impl Iterator<Item = &'a str>) -> Result<Vec<u8>> {
    let dlc_token = tokens
        .next()
        .ok_or_else(|| malformed(line, "missing data length"))?;
    let dlc: usize = dlc_token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|t| t.parse().ok())
        .filter(|n| *n <= 8)
        .ok_or_else(|| malformed(line, "invalid data length"))?;

    let data = tokens
        .take(dlc)
        .map(|t| u8::from_str_radix(t, 16).map_err(|_| malformed(line, "payload is not hex")))
        .collect::<Result<Vec<u8>>>()?;

    if data.len() != dlc {
        return Err(malformed(line, "payload shorter than data length"));
    }
    Ok(data)
}
