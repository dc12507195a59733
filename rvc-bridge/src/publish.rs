//! Publication sinks
//!
//! The bridge hands every publication to a [`Publisher`]. The line publisher
//! writes `topic<TAB>json` lines and stands in for a broker client.

use anyhow::Result;
use rvc_codec::Publication;
use std::io::Write;

/// Destination for decoded and composite records
pub trait Publisher {
    fn publish(&mut self, publication: &Publication) -> Result<()>;
}

/// Writes one `topic<TAB>json` line per publication
pub struct LinePublisher<W: Write> {
    writer: W,
}

impl<W: Write> LinePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for LinePublisher<W> {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        log::trace!(
            "Publishing to {} (retain: {})",
            publication.topic,
            publication.retain
        );
        writeln!(self.writer, "{}\t{}", publication.topic, publication.payload())?;
        Ok(())
    }
}
