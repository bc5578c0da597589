//! Output target interface.
//!
//! A sink is the destination container: it accepts stream declarations,
//! one header, aligned packets, and one trailer, after which the output
//! is closed to further appends. The segmented playlist implementation
//! lives in the `weft-hls` crate; [`MemorySink`] records everything in
//! memory for tests and embedders.

use crate::error::SinkError;
use crate::packet::{CodecParams, Packet};
use crate::timebase::TimeBase;

/// Options fixed at session start and handed to the sink with the
/// header write.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Target duration of one output segment, in seconds.
    pub segment_seconds: f64,
    /// Number of the first segment produced.
    pub start_number: u64,
    /// Segment file name template, printf style (`seg_%03d.ts`).
    pub segment_template: String,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            segment_seconds: 6.0,
            start_number: 0,
            segment_template: "segment_%03d.ts".to_string(),
        }
    }
}

/// Destination container for one session.
///
/// Call order is enforced by the session: all `declare_stream` calls,
/// then `write_header` exactly once, then any number of `write_packet`,
/// then `write_trailer` at most once. Sinks are `Send` so independent
/// sessions can run on separate threads; one sink still has exactly one
/// owning session.
pub trait MediaSink: Send {
    /// Declare one output stream; returns its index.
    fn declare_stream(
        &mut self,
        params: &CodecParams,
        time_base: TimeBase,
    ) -> Result<usize, SinkError>;

    /// Write the container header. After this the declared stream set is
    /// frozen and the output is appendable.
    fn write_header(&mut self, options: &SinkOptions) -> Result<(), SinkError>;

    /// Write one aligned packet.
    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError>;

    /// Mark the output closed; no further packets may be written.
    fn write_trailer(&mut self) -> Result<(), SinkError>;
}

/// In-memory sink that records everything it is handed.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub streams: Vec<(CodecParams, TimeBase)>,
    pub packets: Vec<Packet>,
    pub header_written: bool,
    pub trailer_written: bool,
    /// When set, `write_packet` fails once this many packets were taken.
    pub fail_after: Option<usize>,
    /// When set, `write_header` fails.
    pub fail_header: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed DTS sequence for one stream, in write order.
    pub fn dts_of(&self, stream: usize) -> Vec<i64> {
        self.packets
            .iter()
            .filter(|p| p.stream == stream)
            .map(|p| p.dts)
            .collect()
    }
}

impl MediaSink for MemorySink {
    fn declare_stream(
        &mut self,
        params: &CodecParams,
        time_base: TimeBase,
    ) -> Result<usize, SinkError> {
        self.streams.push((params.clone(), time_base));
        Ok(self.streams.len() - 1)
    }

    fn write_header(&mut self, _options: &SinkOptions) -> Result<(), SinkError> {
        if self.fail_header {
            return Err(SinkError::Header {
                message: "memory sink configured to fail".to_string(),
            });
        }
        self.header_written = true;
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        if let Some(limit) = self.fail_after {
            if self.packets.len() >= limit {
                return Err(SinkError::Write {
                    message: format!("memory sink full after {limit} packets"),
                });
            }
        }
        self.packets.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        self.trailer_written = true;
        Ok(())
    }
}
