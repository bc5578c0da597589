//! Silence synthesis and the audio encoder seam.
//!
//! Inserted silence is generated sample-by-sample, pushed through an
//! [`AudioEncoder`] in encoder-sized frames, and exposed as an ordinary
//! [`MediaSource`] whose packets start at a relative timestamp of 0.
//! From there the continuity engine treats it exactly like a real clip -
//! offset, clamps, commit - including the encoder's flush output.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::SourceError;
use crate::packet::{CodecParams, MediaKind, SourcePacket, SourceStream};
use crate::source::MediaSource;
use crate::timebase::TimeBase;

/// Frames of audio per encoded silence packet.
const PCM_FRAME_SIZE: usize = 1024;

/// One encoded packet with timestamps relative to the start of the
/// encode run, in the encoder's time base.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub ts: i64,
    pub duration: i64,
    pub payload: Bytes,
}

/// Encoder pipeline at its interface: feed interleaved samples, collect
/// packets, flush whatever the codec still holds at the end.
pub trait AudioEncoder: Send {
    /// Frames the encoder wants per `encode` call.
    fn frame_size(&self) -> usize;

    fn time_base(&self) -> TimeBase;

    fn params(&self) -> &CodecParams;

    /// Feed interleaved samples; returns zero or more finished packets.
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<EncodedPacket>, SourceError>;

    /// Drain everything still buffered.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>, SourceError>;
}

/// Pass-through PCM "encoder": buffers interleaved s16le samples and
/// emits one packet per complete frame; `flush` emits the partial tail.
pub struct PcmEncoder {
    params: CodecParams,
    frame_size: usize,
    buffer: Vec<i16>,
    next_ts: i64,
}

impl PcmEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            params: CodecParams::audio("pcm_s16le", sample_rate, channels),
            frame_size: PCM_FRAME_SIZE,
            buffer: Vec::new(),
            next_ts: 0,
        }
    }

    fn pack(&mut self, frames: usize) -> EncodedPacket {
        let channels = self.params.channels as usize;
        let samples: Vec<i16> = self.buffer.drain(..frames * channels).collect();
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for s in &samples {
            payload.extend_from_slice(&s.to_le_bytes());
        }
        let packet = EncodedPacket {
            ts: self.next_ts,
            duration: frames as i64,
            payload: Bytes::from(payload),
        };
        self.next_ts += frames as i64;
        packet
    }
}

impl AudioEncoder for PcmEncoder {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::hz(self.params.sample_rate)
    }

    fn params(&self) -> &CodecParams {
        &self.params
    }

    fn encode(&mut self, samples: &[i16]) -> Result<Vec<EncodedPacket>, SourceError> {
        self.buffer.extend_from_slice(samples);
        let channels = self.params.channels as usize;
        let mut packets = Vec::new();
        while self.buffer.len() >= self.frame_size * channels {
            packets.push(self.pack(self.frame_size));
        }
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, SourceError> {
        let channels = self.params.channels as usize;
        let frames = self.buffer.len() / channels;
        if frames == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![self.pack(frames)])
    }
}

/// Synthetic silence as a [`MediaSource`]: one audio stream whose
/// parameters mirror the output stream the silence will land on.
pub struct SilenceSource {
    streams: Vec<SourceStream>,
    encoder: Box<dyn AudioEncoder>,
    /// Frames still to synthesize.
    remaining: u64,
    queue: VecDeque<SourcePacket>,
    flushed: bool,
}

impl SilenceSource {
    /// Silence through the PCM pipeline, matching `sample_rate`/`channels`.
    ///
    /// The synthesized length is `seconds * sample_rate` frames,
    /// truncated, exactly like the original sample-count arithmetic.
    pub fn pcm(sample_rate: u32, channels: u16, seconds: f64) -> Self {
        Self::with_encoder(Box::new(PcmEncoder::new(sample_rate, channels)), seconds)
    }

    pub fn with_encoder(encoder: Box<dyn AudioEncoder>, seconds: f64) -> Self {
        let params = encoder.params().clone();
        let remaining = (seconds * params.sample_rate as f64) as i64;
        let streams = vec![SourceStream {
            kind: MediaKind::Audio,
            time_base: encoder.time_base(),
            params,
        }];
        Self {
            streams,
            encoder,
            remaining: remaining.max(0) as u64,
            queue: VecDeque::new(),
            flushed: false,
        }
    }

    fn enqueue(&mut self, packets: Vec<EncodedPacket>) {
        for p in packets {
            self.queue.push_back(SourcePacket {
                stream: 0,
                dts: Some(p.ts),
                pts: Some(p.ts),
                duration: p.duration,
                keyframe: true,
                payload: p.payload,
            });
        }
    }
}

impl MediaSource for SilenceSource {
    fn streams(&self) -> &[SourceStream] {
        &self.streams
    }

    fn next_packet(&mut self) -> Result<Option<SourcePacket>, SourceError> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Ok(Some(packet));
            }
            if self.remaining > 0 {
                let frames = (self.encoder.frame_size() as u64).min(self.remaining) as usize;
                let channels = self.streams[0].params.channels as usize;
                let zeros = vec![0i16; frames * channels];
                self.remaining -= frames as u64;
                let packets = self.encoder.encode(&zeros)?;
                self.enqueue(packets);
                continue;
            }
            if !self.flushed {
                self.flushed = true;
                let packets = self.encoder.flush()?;
                self.enqueue(packets);
                continue;
            }
            return Ok(None);
        }
    }
}
