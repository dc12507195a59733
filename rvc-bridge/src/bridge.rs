//! Bridge between capture/command lines and the codec
//!
//! Inbound frames are decoded, published under their record topic and fed
//! to the status correlator. Inbound commands (`<NAME> <json>`) are encoded
//! into frames addressed with the configured priority and source address.
//! Per-message failures are logged and the message dropped.

use crate::config::CanConfig;
use crate::publish::Publisher;
use anyhow::{Context, Result};
use rvc_codec::formats::CandumpParser;
use rvc_codec::{
    BridgeConfig, CanFrame, CanId, Codec, CodecError, Dgn, FieldInput, Publication,
    StatusCorrelator,
};
use std::io::BufRead;
use std::sync::Arc;

/// Counters for one run over a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub filtered: usize,
    pub publications: usize,
    pub errors: usize,
}

pub struct Bridge {
    codec: Arc<Codec>,
    correlator: StatusCorrelator,
    config: BridgeConfig,
    can: CanConfig,
}

impl Bridge {
    pub fn new(codec: Arc<Codec>, config: BridgeConfig, can: CanConfig) -> Self {
        Self {
            correlator: StatusCorrelator::from_config(&config),
            codec,
            config,
            can,
        }
    }

    /// Publications produced by one inbound frame
    ///
    /// The decoded record is always published; a composite status record
    /// follows when the frame changed a driver's composite.
    pub fn process_frame(&self, frame: &CanFrame) -> Vec<Publication> {
        if !self.config.should_process_dgn(frame.id.dgn) {
            return Vec::new();
        }

        let record = self.codec.decode_frame(frame);
        let topic = self.config.record_topic(&record);

        let composite = match self.correlator.update(&record) {
            Ok(composite) => composite,
            Err(e) => {
                log::warn!("Dropping {} from correlation: {}", topic, e);
                None
            }
        };

        let mut publications = vec![Publication::new(topic, record, false)];
        publications.extend(composite);
        publications
    }

    /// Read capture lines until EOF, publishing as frames arrive
    pub fn run<R: BufRead, P: Publisher>(&self, reader: R, publisher: &mut P) -> Result<RunStats> {
        let mut stats = RunStats::default();

        for frame in CandumpParser::from_reader(reader) {
            let frame = match frame {
                Ok(frame) => frame,
                Err(CodecError::IoError(e)) => {
                    return Err(e).context("Failed to read capture input");
                }
                Err(e) => {
                    log::warn!("Skipping capture line: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };
            stats.frames += 1;

            let publications = self.process_frame(&frame);
            if publications.is_empty() {
                stats.filtered += 1;
            }
            for publication in &publications {
                publisher.publish(publication)?;
                stats.publications += 1;
            }
        }

        log::info!(
            "Processed {} frames: {} publications, {} filtered, {} errors",
            stats.frames,
            stats.publications,
            stats.filtered,
            stats.errors
        );
        Ok(stats)
    }

    /// Encode one `<NAME> <json>` command line into a frame
    ///
    /// `NAME` is a display name or, failing that, a 5-digit DGN.
    pub fn process_command(&self, line: &str) -> Result<CanFrame> {
        let line = line.trim();
        let (name, body) = line
            .split_once(char::is_whitespace)
            .map(|(name, body)| (name, body.trim()))
            .unwrap_or((line, "{}"));

        let input = FieldInput::from_json_str(body)
            .with_context(|| format!("Invalid command body for {}", name))?;

        let (dgn, payload) = match self.codec.encode_by_name(name, &input) {
            Ok(encoded) => encoded,
            Err(CodecError::UnknownMessageType(_)) if name.parse::<Dgn>().is_ok() => {
                let dgn: Dgn = name.parse()?;
                (dgn, self.codec.encode(dgn, &input)?)
            }
            Err(e) => return Err(e).with_context(|| format!("Cannot encode {}", name)),
        };

        let id = CanId::new(self.can.priority, dgn, self.can.source_address)?;
        Ok(CanFrame::new(self.can.interface.clone(), id, payload.to_vec()))
    }
}
