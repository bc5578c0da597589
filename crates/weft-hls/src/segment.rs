//! Binary media segments.
//!
//! One segment file holds a run of aligned packets framed the same way
//! on every platform:
//!
//! ```text
//! Header:  "WSEG01" (6 bytes)
//!          stream count     u16
//!          per stream:      kind u8 (0 audio, 1 video)
//!                           time base num u32, den u32
//! Packet:  stream           u16
//!          flags            u8  (bit 0: keyframe)
//!          dts              i64
//!          pts              i64
//!          duration         i64
//!          payload length   u32
//!          payload          bytes
//! ```
//!
//! All integers are big-endian. Segment file names come from a printf
//! style `%0Nd` template so playlists keep the numbering the caller
//! asked for.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tracing::debug;

use weft::{MediaKind, Packet, SinkError, TimeBase};

pub const SEGMENT_MAGIC: &[u8; 6] = b"WSEG01";

const FLAG_KEYFRAME: u8 = 0x01;

/// Printf-style segment name template: one `%d` or `%0Nd` placeholder.
#[derive(Debug, Clone)]
pub struct SegmentTemplate {
    prefix: String,
    width: usize,
    suffix: String,
}

impl SegmentTemplate {
    pub fn parse(template: &str) -> Result<Self, SinkError> {
        let invalid = |message: &str| SinkError::Template {
            template: template.to_string(),
            message: message.to_string(),
        };

        let Some(percent) = template.find('%') else {
            return Err(invalid("missing a %d placeholder"));
        };
        let prefix = template[..percent].to_string();
        let rest = &template[percent + 1..];

        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let after = &rest[digits.len()..];
        if !after.starts_with('d') {
            return Err(invalid("placeholder must be %d or %0Nd"));
        }
        let width = if digits.is_empty() {
            1
        } else {
            if !digits.starts_with('0') {
                return Err(invalid("field width must start with 0"));
            }
            digits.parse().map_err(|_| invalid("unreadable field width"))?
        };

        let suffix = after[1..].to_string();
        if suffix.contains('%') {
            return Err(invalid("more than one placeholder"));
        }

        Ok(Self {
            prefix,
            width,
            suffix,
        })
    }

    pub fn render(&self, number: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            number,
            self.suffix,
            width = self.width
        )
    }
}

/// What a finished segment contributed to the playlist.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub file_name: String,
    pub duration: f64,
    pub packets: u64,
}

/// Writer for one open segment file.
#[derive(Debug)]
pub struct SegmentWriter {
    path: PathBuf,
    file_name: String,
    writer: BufWriter<File>,
    start_secs: Option<f64>,
    end_secs: f64,
    packets: u64,
}

impl SegmentWriter {
    pub fn create(
        dir: &Path,
        file_name: &str,
        streams: &[(MediaKind, TimeBase)],
    ) -> Result<Self, SinkError> {
        let path = dir.join(file_name);
        let file = File::create(&path).map_err(|e| SinkError::Create {
            path: path.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);

        let mut header = BytesMut::with_capacity(8 + streams.len() * 9);
        header.put_slice(SEGMENT_MAGIC);
        header.put_u16(streams.len() as u16);
        for (kind, tb) in streams {
            header.put_u8(match kind {
                MediaKind::Audio => 0,
                MediaKind::Video => 1,
            });
            header.put_u32(tb.num);
            header.put_u32(tb.den);
        }
        writer.write_all(&header).map_err(|e| SinkError::Io {
            path: path.clone(),
            source: e,
        })?;

        debug!(segment = %path.display(), "segment opened");
        Ok(Self {
            path,
            file_name: file_name.to_string(),
            writer,
            start_secs: None,
            end_secs: 0.0,
            packets: 0,
        })
    }

    /// Frame one packet into the segment. `start`/`end` are the
    /// packet's position in seconds on the output timeline.
    pub fn write_packet(&mut self, packet: &Packet, start: f64, end: f64) -> Result<(), SinkError> {
        let mut frame = BytesMut::with_capacity(31 + packet.payload.len());
        frame.put_u16(packet.stream as u16);
        frame.put_u8(if packet.keyframe { FLAG_KEYFRAME } else { 0 });
        frame.put_i64(packet.dts);
        frame.put_i64(packet.pts);
        frame.put_i64(packet.duration);
        frame.put_u32(packet.payload.len() as u32);
        frame.put_slice(&packet.payload);

        self.writer
            .write_all(&frame)
            .map_err(|e| SinkError::Write {
                message: format!("{}: {e}", self.path.display()),
            })?;

        self.start_secs.get_or_insert(start);
        self.end_secs = self.end_secs.max(end);
        self.packets += 1;
        Ok(())
    }

    /// Seconds this segment spans if it ended at `now`.
    pub fn span_until(&self, now: f64) -> f64 {
        match self.start_secs {
            Some(start) => now - start,
            None => 0.0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Flush and close, reporting the playlist entry.
    pub fn finish(mut self) -> Result<SegmentRecord, SinkError> {
        self.writer.flush().map_err(|e| SinkError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let duration = (self.end_secs - self.start_secs.unwrap_or(0.0)).max(0.0);
        debug!(
            segment = %self.path.display(),
            packets = self.packets,
            duration,
            "segment closed"
        );
        Ok(SegmentRecord {
            file_name: self.file_name,
            duration,
            packets: self.packets,
        })
    }
}

/// Errors reading a segment file back.
#[derive(Debug, Error)]
pub enum SegmentReadError {
    #[error("could not open segment {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a weft segment")]
    BadMagic { path: PathBuf },

    #[error("truncated segment {path}")]
    Truncated { path: PathBuf },

    #[error("i/o error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reader for segment files; used by tooling and tests to verify what
/// a session actually committed.
#[derive(Debug)]
pub struct SegmentReader {
    reader: BufReader<File>,
    path: PathBuf,
    streams: Vec<(MediaKind, TimeBase)>,
}

impl SegmentReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SegmentReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SegmentReadError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 6];
        reader
            .read_exact(&mut magic)
            .map_err(|_| SegmentReadError::BadMagic {
                path: path.to_path_buf(),
            })?;
        if &magic != SEGMENT_MAGIC {
            return Err(SegmentReadError::BadMagic {
                path: path.to_path_buf(),
            });
        }

        let mut count = [0u8; 2];
        reader
            .read_exact(&mut count)
            .map_err(|_| SegmentReadError::Truncated {
                path: path.to_path_buf(),
            })?;
        let count = u16::from_be_bytes(count);

        let mut streams = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut raw = [0u8; 9];
            reader
                .read_exact(&mut raw)
                .map_err(|_| SegmentReadError::Truncated {
                    path: path.to_path_buf(),
                })?;
            let mut buf = &raw[..];
            let kind = match buf.get_u8() {
                1 => MediaKind::Video,
                _ => MediaKind::Audio,
            };
            let num = buf.get_u32();
            let den = buf.get_u32();
            streams.push((kind, TimeBase::new(num, den)));
        }

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            streams,
        })
    }

    pub fn streams(&self) -> &[(MediaKind, TimeBase)] {
        &self.streams
    }

    pub fn next_packet(&mut self) -> Result<Option<Packet>, SegmentReadError> {
        let mut fixed = [0u8; 31];
        match self.reader.read_exact(&mut fixed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(SegmentReadError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        }

        let mut buf = &fixed[..];
        let stream = buf.get_u16() as usize;
        let flags = buf.get_u8();
        let dts = buf.get_i64();
        let pts = buf.get_i64();
        let duration = buf.get_i64();
        let len = buf.get_u32() as usize;

        let mut payload = vec![0u8; len];
        self.reader
            .read_exact(&mut payload)
            .map_err(|_| SegmentReadError::Truncated {
                path: self.path.clone(),
            })?;

        Ok(Some(Packet {
            stream,
            dts,
            pts,
            duration,
            keyframe: flags & FLAG_KEYFRAME != 0,
            payload: payload.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn template_renders_padded_numbers() {
        let t = SegmentTemplate::parse("seg_%03d.ts").unwrap();
        assert_eq!(t.render(0), "seg_000.ts");
        assert_eq!(t.render(42), "seg_042.ts");
        assert_eq!(t.render(1234), "seg_1234.ts");
    }

    #[test]
    fn template_accepts_bare_placeholder() {
        let t = SegmentTemplate::parse("part%d.bin").unwrap();
        assert_eq!(t.render(7), "part7.bin");
    }

    #[test]
    fn template_rejects_garbage() {
        assert!(SegmentTemplate::parse("no-placeholder.ts").is_err());
        assert!(SegmentTemplate::parse("seg_%s.ts").is_err());
        assert!(SegmentTemplate::parse("seg_%3d.ts").is_err());
        assert!(SegmentTemplate::parse("a_%d_%d.ts").is_err());
    }

    #[test]
    fn packets_roundtrip_through_a_segment() {
        let dir = tempfile::tempdir().unwrap();
        let streams = vec![(MediaKind::Audio, TimeBase::hz(48000))];

        let mut writer = SegmentWriter::create(dir.path(), "seg_000.ts", &streams).unwrap();
        let packet = Packet {
            stream: 0,
            dts: 48001,
            pts: 48001,
            duration: 1024,
            keyframe: true,
            payload: Bytes::from_static(b"payload bytes"),
        };
        writer.write_packet(&packet, 1.0, 1.02).unwrap();
        let record = writer.finish().unwrap();
        assert_eq!(record.packets, 1);
        assert!((record.duration - 0.02).abs() < 1e-9);

        let mut reader = SegmentReader::open(dir.path().join("seg_000.ts")).unwrap();
        assert_eq!(reader.streams(), &[(MediaKind::Audio, TimeBase::hz(48000))]);
        let read = reader.next_packet().unwrap().unwrap();
        assert_eq!(read.stream, 0);
        assert_eq!(read.dts, 48001);
        assert_eq!(read.pts, 48001);
        assert_eq!(read.duration, 1024);
        assert!(read.keyframe);
        assert_eq!(&read.payload[..], b"payload bytes");
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn non_segment_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.ts");
        std::fs::write(&path, b"#EXTM3U\n").unwrap();

        let err = SegmentReader::open(&path).unwrap_err();
        assert!(matches!(err, SegmentReadError::BadMagic { .. }));
    }
}
