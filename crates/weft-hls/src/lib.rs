//! Segmented playlist sink for weft sessions.
//!
//! [`SegmentedSink`] implements [`weft::MediaSink`] on top of two
//! pieces: rotating binary segment files ([`segment`]) and a growing
//! event playlist ([`playlist`]). The playlist stays appendable across
//! process restarts until a trailer writes the end marker; after that
//! the target refuses to open again.
//!
//! Segments rotate when the accumulated span reaches the configured
//! target duration. When a video stream is declared, rotation waits for
//! the next video keyframe so every segment starts decodable; pure
//! audio rotates on any packet boundary.

pub mod playlist;
pub mod segment;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use weft::{CodecParams, MediaKind, MediaSink, Packet, SinkError, SinkOptions, TimeBase};

pub use playlist::{Playlist, SegmentEntry};
pub use segment::{SegmentReader, SegmentRecord, SegmentTemplate, SegmentWriter};

/// Filesystem-backed sink: a playlist file plus numbered segments in
/// the same directory.
#[derive(Debug)]
pub struct SegmentedSink {
    playlist: Playlist,
    dir: PathBuf,
    streams: Vec<(MediaKind, TimeBase)>,
    template: Option<SegmentTemplate>,
    segment_seconds: f64,
    header_written: bool,
    finished: bool,
    current: Option<SegmentWriter>,
    next_number: u64,
    has_video: bool,
}

impl SegmentedSink {
    /// Open (or create) the playlist target. The header is not written
    /// here; a target whose playlist is already end-marked is refused.
    pub fn create(playlist_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = playlist_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SinkError::Create {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let playlist = Playlist::load_or_new(path)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(playlist = %path.display(), "output target opened");
        Ok(Self {
            playlist,
            dir,
            streams: Vec::new(),
            template: None,
            segment_seconds: 0.0,
            header_written: false,
            finished: false,
            current: None,
            next_number: 0,
            has_video: false,
        })
    }

    pub fn playlist_path(&self) -> &Path {
        self.playlist.path()
    }

    /// Close the current segment, if any, and index it in the playlist.
    fn roll_segment(&mut self) -> Result<(), SinkError> {
        let Some(writer) = self.current.take() else {
            return Ok(());
        };
        let record = writer.finish()?;
        debug!(
            segment = %record.file_name,
            duration = record.duration,
            packets = record.packets,
            "segment rotated"
        );
        self.playlist.add_entry(record.duration, record.file_name)
    }

    fn open_segment(&mut self) -> Result<(), SinkError> {
        let template = self.template.as_ref().expect("header precedes packets");
        let file_name = template.render(self.next_number);
        self.next_number += 1;
        let writer = SegmentWriter::create(&self.dir, &file_name, &self.streams)?;
        self.current = Some(writer);
        Ok(())
    }
}

impl MediaSink for SegmentedSink {
    fn declare_stream(
        &mut self,
        params: &CodecParams,
        time_base: TimeBase,
    ) -> Result<usize, SinkError> {
        if self.header_written {
            return Err(SinkError::Header {
                message: "stream set is frozen once the header is written".to_string(),
            });
        }
        self.streams.push((params.kind, time_base));
        Ok(self.streams.len() - 1)
    }

    fn write_header(&mut self, options: &SinkOptions) -> Result<(), SinkError> {
        if self.streams.is_empty() {
            return Err(SinkError::Header {
                message: "no streams declared".to_string(),
            });
        }
        let template = SegmentTemplate::parse(&options.segment_template)?;
        self.playlist.prepare(options)?;

        self.template = Some(template);
        self.segment_seconds = options.segment_seconds.max(0.0);
        self.next_number = options.start_number;
        self.has_video = self.streams.iter().any(|(k, _)| *k == MediaKind::Video);
        self.header_written = true;
        info!(
            streams = self.streams.len(),
            segment_seconds = self.segment_seconds,
            "header written; output is appendable"
        );
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        if !self.header_written {
            return Err(SinkError::Write {
                message: "packet before header".to_string(),
            });
        }
        if self.finished {
            return Err(SinkError::Write {
                message: "output already closed".to_string(),
            });
        }
        let Some(&(kind, tb)) = self.streams.get(packet.stream) else {
            return Err(SinkError::Write {
                message: format!("packet for undeclared stream {}", packet.stream),
            });
        };

        let start = tb.to_seconds(packet.dts);
        let end = tb.to_seconds(packet.dts + packet.duration.max(0));

        if let Some(current) = &self.current {
            let due = current.span_until(start) >= self.segment_seconds;
            let boundary =
                !self.has_video || (kind == MediaKind::Video && packet.keyframe);
            if due && boundary {
                self.roll_segment()?;
            }
        }
        if self.current.is_none() {
            self.open_segment()?;
        }

        self.current
            .as_mut()
            .expect("segment opened above")
            .write_packet(packet, start, end)
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        self.roll_segment()
            .map_err(|e| SinkError::Trailer { message: e.to_string() })?;
        self.playlist.finalize()?;
        self.finished = true;
        info!(playlist = %self.playlist.path().display(), "output closed");
        Ok(())
    }
}
