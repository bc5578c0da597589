//! Media model: stream kinds, codec parameters, and packets.

use bytes::Bytes;

use crate::timebase::TimeBase;

/// Elementary stream kind. The session declares at most one output
/// stream per kind, from the first clip that provides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Codec parameters copied verbatim from the clip that declares an
/// output stream. Weft never transcodes; these describe payload bytes
/// it forwards as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParams {
    pub kind: MediaKind,
    /// Codec name, e.g. "pcm_s16le", "mp3", "flac".
    pub codec: String,
    /// Audio only; 0 for video.
    pub sample_rate: u32,
    /// Audio only; 0 for video.
    pub channels: u16,
    /// Video only; 0 for audio.
    pub width: u32,
    /// Video only; 0 for audio.
    pub height: u32,
    /// Codec private data, forwarded opaquely when present.
    pub extradata: Option<Bytes>,
}

impl CodecParams {
    pub fn audio(codec: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            kind: MediaKind::Audio,
            codec: codec.into(),
            sample_rate,
            channels,
            width: 0,
            height: 0,
            extradata: None,
        }
    }

    pub fn video(codec: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            codec: codec.into(),
            sample_rate: 0,
            channels: 0,
            width,
            height,
            extradata: None,
        }
    }
}

/// One stream as exposed by a source adapter, in the clip's own units.
#[derive(Debug, Clone)]
pub struct SourceStream {
    pub kind: MediaKind,
    pub time_base: TimeBase,
    pub params: CodecParams,
}

/// Packet as yielded by a source adapter. Timestamps are optional and
/// live in the source stream's time base; `stream` indexes into the
/// adapter's stream list.
#[derive(Debug, Clone)]
pub struct SourcePacket {
    pub stream: usize,
    pub dts: Option<i64>,
    pub pts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
    pub payload: Bytes,
}

/// Packet after continuity alignment: timestamps are final, mandatory,
/// and in the destination stream's time base; `stream` indexes the
/// declared output streams.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream: usize,
    pub dts: i64,
    pub pts: i64,
    pub duration: i64,
    pub keyframe: bool,
    pub payload: Bytes,
}
