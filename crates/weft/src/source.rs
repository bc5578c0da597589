//! Clip source adapters.
//!
//! A [`MediaSource`] yields (stream, packet) pairs in the clip's own
//! time base; closing is Drop. [`ClipSource`] opens files: WAV via hound
//! is always available, MP3/FLAC/OGG packet passthrough is available
//! behind the `symphonia-decode` feature. Compressed clips are never
//! transcoded - container packets are forwarded with their original
//! timestamps, which is exactly what the continuity engine wants to
//! rebase.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::SourceError;
use crate::packet::{CodecParams, MediaKind, SourcePacket, SourceStream};
use crate::timebase::TimeBase;

/// Frames of audio carried per WAV packet.
const WAV_PACKET_FRAMES: usize = 1024;

/// One opened clip (or synthetic source): a fixed stream list and a
/// packet pump. Resources are released on Drop. Sources are `Send` so a
/// whole session can live on whichever thread its owner runs.
pub trait MediaSource: Send {
    fn streams(&self) -> &[SourceStream];

    /// Next packet in arrival order, `None` at end of clip.
    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError>;
}

/// File-backed clip source.
#[derive(Debug)]
pub struct ClipSource {
    inner: ClipInner,
}

#[derive(Debug)]
enum ClipInner {
    Wav(WavClip),
    #[cfg(feature = "symphonia-decode")]
    Compressed(CompressedClip),
}

impl ClipSource {
    /// Open a clip and probe its stream layout.
    ///
    /// Fails with [`SourceError::Open`] when the file cannot be read,
    /// [`SourceError::NoStreams`] when it carries nothing usable, and
    /// [`SourceError::Unsupported`] for formats this build cannot parse.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();

        let mut magic = [0u8; 4];
        let mut file = File::open(path).map_err(|e| SourceError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let read = file.read(&mut magic).map_err(|e| SourceError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        drop(file);

        if read >= 4 && &magic == b"RIFF" {
            let clip = WavClip::open(path)?;
            debug!(path = %path.display(), "opened WAV clip");
            return Ok(Self {
                inner: ClipInner::Wav(clip),
            });
        }

        #[cfg(feature = "symphonia-decode")]
        {
            let clip = CompressedClip::open(path)?;
            debug!(path = %path.display(), "opened compressed clip");
            Ok(Self {
                inner: ClipInner::Compressed(clip),
            })
        }
        #[cfg(not(feature = "symphonia-decode"))]
        {
            Err(SourceError::Unsupported {
                path: path.to_path_buf(),
            })
        }
    }
}

impl MediaSource for ClipSource {
    fn streams(&self) -> &[SourceStream] {
        match &self.inner {
            ClipInner::Wav(clip) => &clip.streams,
            #[cfg(feature = "symphonia-decode")]
            ClipInner::Compressed(clip) => &clip.streams,
        }
    }

    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError> {
        match &mut self.inner {
            ClipInner::Wav(clip) => clip.next_packet(),
            #[cfg(feature = "symphonia-decode")]
            ClipInner::Compressed(clip) => clip.next_packet(),
        }
    }
}

/// WAV clip: samples are normalized to interleaved s16le packets of
/// [`WAV_PACKET_FRAMES`] frames, timestamped by running frame offset in
/// a 1/sample_rate time base.
struct WavClip {
    reader: hound::WavReader<std::io::BufReader<File>>,
    streams: Vec<SourceStream>,
    path: PathBuf,
    cursor_frames: u64,
}

impl std::fmt::Debug for WavClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavClip")
            .field("streams", &self.streams)
            .field("path", &self.path)
            .field("cursor_frames", &self.cursor_frames)
            .finish_non_exhaustive()
    }
}

impl WavClip {
    fn open(path: &Path) -> Result<Self, SourceError> {
        let reader = hound::WavReader::open(path).map_err(|e| SourceError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(SourceError::NoStreams {
                path: path.to_path_buf(),
            });
        }

        let streams = vec![SourceStream {
            kind: MediaKind::Audio,
            time_base: TimeBase::hz(spec.sample_rate),
            params: CodecParams::audio("pcm_s16le", spec.sample_rate, spec.channels),
        }];

        Ok(Self {
            reader,
            streams,
            path: path.to_path_buf(),
            cursor_frames: 0,
        })
    }

    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError> {
        let spec = self.reader.spec();
        let channels = spec.channels as usize;
        let want = WAV_PACKET_FRAMES * channels;

        let mut samples: Vec<i16> = Vec::with_capacity(want);
        match spec.sample_format {
            hound::SampleFormat::Float => {
                for s in self.reader.samples::<f32>().take(want) {
                    let v = s.map_err(|e| read_error(&self.path, e))?;
                    samples.push((v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                }
            }
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                for s in self.reader.samples::<i32>().take(want) {
                    let v = s.map_err(|e| read_error(&self.path, e))?;
                    let normalized = v as f32 / max;
                    samples.push((normalized.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                }
            }
        }

        if samples.is_empty() {
            return Ok(None);
        }

        let frames = (samples.len() / channels) as i64;
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for s in &samples {
            payload.extend_from_slice(&s.to_le_bytes());
        }

        let dts = self.cursor_frames as i64;
        self.cursor_frames += frames as u64;

        Ok(Some(SourcePacket {
            stream: 0,
            dts: Some(dts),
            pts: Some(dts),
            duration: frames,
            keyframe: true,
            payload: Bytes::from(payload),
        }))
    }
}

fn read_error(path: &Path, e: hound::Error) -> SourceError {
    SourceError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Compressed clip passthrough via symphonia. Container packets are
/// forwarded untouched, timestamps in the track's own time base.
#[cfg(feature = "symphonia-decode")]
struct CompressedClip {
    format: Box<dyn symphonia::core::formats::FormatReader>,
    streams: Vec<SourceStream>,
    /// track id -> index into `streams`
    track_map: Vec<(u32, usize)>,
    path: PathBuf,
}

#[cfg(feature = "symphonia-decode")]
impl std::fmt::Debug for CompressedClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedClip")
            .field("streams", &self.streams)
            .field("track_map", &self.track_map)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "symphonia-decode")]
impl CompressedClip {
    fn open(path: &Path) -> Result<Self, SourceError> {
        use symphonia::core::codecs::CODEC_TYPE_NULL;
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;

        let file = File::open(path).map_err(|e| SourceError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SourceError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let format = probed.format;

        let mut streams = Vec::new();
        let mut track_map = Vec::new();
        for track in format.tracks() {
            let params = &track.codec_params;
            if params.codec == CODEC_TYPE_NULL {
                continue;
            }
            let Some(sample_rate) = params.sample_rate else {
                continue;
            };
            let time_base = params
                .time_base
                .map(|tb| TimeBase::new(tb.numer, tb.denom))
                .unwrap_or_else(|| TimeBase::hz(sample_rate));
            let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

            let mut codec = CodecParams::audio(codec_name(params.codec), sample_rate, channels);
            codec.extradata = params
                .extra_data
                .as_ref()
                .map(|data| Bytes::copy_from_slice(data));

            track_map.push((track.id, streams.len()));
            streams.push(SourceStream {
                kind: MediaKind::Audio,
                time_base,
                params: codec,
            });
        }

        if streams.is_empty() {
            return Err(SourceError::NoStreams {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            format,
            streams,
            track_map,
            path: path.to_path_buf(),
        })
    }

    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError> {
        use symphonia::core::errors::Error;

        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(SourceError::Read {
                        path: self.path.clone(),
                        message: e.to_string(),
                    });
                }
            };

            let Some(&(_, stream)) = self
                .track_map
                .iter()
                .find(|(id, _)| *id == packet.track_id())
            else {
                continue;
            };

            let ts = packet.ts() as i64;
            return Ok(Some(SourcePacket {
                stream,
                dts: Some(ts),
                pts: Some(ts),
                duration: packet.dur() as i64,
                keyframe: true,
                payload: Bytes::copy_from_slice(packet.buf()),
            }));
        }
    }
}

#[cfg(feature = "symphonia-decode")]
fn codec_name(codec: symphonia::core::codecs::CodecType) -> &'static str {
    use symphonia::core::codecs::{
        CODEC_TYPE_AAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_OPUS, CODEC_TYPE_VORBIS,
    };
    match codec {
        CODEC_TYPE_MP3 => "mp3",
        CODEC_TYPE_FLAC => "flac",
        CODEC_TYPE_VORBIS => "vorbis",
        CODEC_TYPE_AAC => "aac",
        CODEC_TYPE_OPUS => "opus",
        _ => "unknown",
    }
}

/// Scripted in-memory source for tests and embedders.
pub struct MemorySource {
    streams: Vec<SourceStream>,
    packets: VecDeque<SourcePacket>,
}

impl MemorySource {
    pub fn new(streams: Vec<SourceStream>) -> Self {
        Self {
            streams,
            packets: VecDeque::new(),
        }
    }

    pub fn push(&mut self, packet: SourcePacket) {
        self.packets.push_back(packet);
    }
}

impl MediaSource for MemorySource {
    fn streams(&self) -> &[SourceStream] {
        &self.streams
    }

    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError> {
        Ok(self.packets.pop_front())
    }
}
