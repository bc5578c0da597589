//! Timeline continuity engine.
//!
//! One engine instance serves one append call. It owns the call's
//! offset - computed once so every packet of the call shifts by the same
//! amount - and borrows the session's cursor table, committing each
//! packet's DTS only after the sink accepted it.
//!
//! Per packet, in arrival order:
//! 1. rebase dts/pts/duration from the source stream's time base into
//!    the destination stream's,
//! 2. shift by the call offset (target start minus the first rebased
//!    DTS; the raw target start when the call opens with a DTS-less
//!    packet),
//! 3. clamp so the committed DTS sequence stays strictly increasing per
//!    stream and PTS never precedes DTS,
//! 4. write, then commit the cursor.
//!
//! Clips whose internal timestamps jump backwards, restart, or go
//! missing are the normal case here, not an error: correcting them
//! loses nothing, while rejecting them would drop media.

use tracing::{debug, trace};

use crate::cursor::CursorTable;
use crate::error::SessionError;
use crate::packet::{CodecParams, MediaKind, Packet, SourcePacket};
use crate::sink::MediaSink;
use crate::source::MediaSource;
use crate::timebase::{rescale, rescale_duration, TimeBase};

/// One declared output stream as the engine sees it.
#[derive(Debug, Clone)]
pub struct OutputStream {
    pub kind: MediaKind,
    pub time_base: TimeBase,
    pub params: CodecParams,
}

/// What one splice call did.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpliceStats {
    pub packets_written: u64,
    pub packets_skipped: u64,
    /// Packets whose timestamps needed correction.
    pub corrected: u64,
    /// First DTS committed by this call, any stream.
    pub first_dts: Option<i64>,
    /// Last DTS committed by this call, any stream.
    pub last_dts: Option<i64>,
}

/// Per-call continuity state. Create one per append, drive it with
/// [`splice`](Self::splice), drop it when the call returns.
pub struct ContinuityEngine<'a> {
    cursors: &'a mut CursorTable,
    target_start: i64,
    offset: Option<i64>,
}

impl<'a> ContinuityEngine<'a> {
    pub fn new(cursors: &'a mut CursorTable) -> Self {
        let target_start = cursors.next_start();
        Self {
            cursors,
            target_start,
            offset: None,
        }
    }

    /// Run every remaining packet of `source` through rebase, offset,
    /// clamp, write, commit. `mapping[i]` names the output stream for
    /// source stream `i`, `None` for streams to skip.
    ///
    /// A sink write failure aborts the remaining packets; cursors keep
    /// the last successfully committed values.
    pub fn splice(
        &mut self,
        source: &mut dyn MediaSource,
        mapping: &[Option<usize>],
        outputs: &[OutputStream],
        sink: &mut dyn MediaSink,
    ) -> Result<SpliceStats, SessionError> {
        let mut stats = SpliceStats::default();

        while let Some(packet) = source.next_packet()? {
            let Some(&Some(out_index)) = mapping.get(packet.stream) else {
                stats.packets_skipped += 1;
                continue;
            };
            let in_tb = source.streams()[packet.stream].time_base;
            let out_tb = outputs[out_index].time_base;

            let aligned = self.align(out_index, in_tb, out_tb, packet, &mut stats);
            sink.write_packet(&aligned)?;
            self.cursors.commit(out_index, aligned.dts);

            stats.packets_written += 1;
            stats.first_dts.get_or_insert(aligned.dts);
            stats.last_dts = Some(aligned.dts);
        }

        Ok(stats)
    }

    /// Steps 1-3 for one packet; pure with respect to the sink.
    fn align(
        &mut self,
        out_index: usize,
        in_tb: TimeBase,
        out_tb: TimeBase,
        packet: SourcePacket,
        stats: &mut SpliceStats,
    ) -> Packet {
        let rebased_dts = packet.dts.map(|v| rescale(v, in_tb, out_tb));
        let rebased_pts = packet.pts.map(|v| rescale(v, in_tb, out_tb));
        let duration = rescale_duration(packet.duration, in_tb, out_tb);

        // The call's offset anchors on the first packet. Without a DTS
        // there is no rebasing reference, so the raw target start has to
        // do; the clamps below keep the sequence valid either way.
        let target_start = self.target_start;
        let offset = *self.offset.get_or_insert_with(|| match rebased_dts {
            Some(first) => target_start - first,
            None => {
                debug!(
                    target_start,
                    "first packet carries no DTS; anchoring offset on raw target start"
                );
                target_start
            }
        });

        let shifted_dts = rebased_dts.map(|v| v + offset);
        let shifted_pts = rebased_pts.map(|v| v + offset);

        let last = self.cursors.last_committed(out_index);
        let dts = match (shifted_dts, last) {
            (None, Some(last)) => last + 1,
            (None, None) => 0,
            (Some(v), Some(last)) if v <= last => last + 1,
            (Some(v), None) if v < 0 => 0,
            (Some(v), _) => v,
        };
        let pts = match shifted_pts {
            None => dts,
            Some(p) if p < dts => dts,
            Some(p) => p,
        };

        if shifted_dts != Some(dts) || shifted_pts != Some(pts) {
            stats.corrected += 1;
            trace!(
                stream = out_index,
                from_dts = ?shifted_dts,
                from_pts = ?shifted_pts,
                dts,
                pts,
                "corrected non-monotonic timestamps"
            );
        }

        Packet {
            stream: out_index,
            dts,
            pts,
            duration,
            keyframe: packet.keyframe,
            payload: packet.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::packet::SourceStream;
    use crate::sink::MemorySink;
    use crate::source::MemorySource;

    fn audio_output(rate: u32) -> OutputStream {
        OutputStream {
            kind: MediaKind::Audio,
            time_base: TimeBase::hz(rate),
            params: CodecParams::audio("pcm_s16le", rate, 2),
        }
    }

    fn audio_source(rate: u32) -> MemorySource {
        MemorySource::new(vec![SourceStream {
            kind: MediaKind::Audio,
            time_base: TimeBase::hz(rate),
            params: CodecParams::audio("pcm_s16le", rate, 2),
        }])
    }

    fn pkt(dts: Option<i64>, pts: Option<i64>, duration: i64) -> SourcePacket {
        SourcePacket {
            stream: 0,
            dts,
            pts,
            duration,
            keyframe: true,
            payload: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn first_clip_lands_at_zero() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(0), Some(0), 1024));
        source.push(pkt(Some(1024), Some(1024), 1024));

        let stats = ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        assert_eq!(stats.packets_written, 2);
        assert_eq!(sink.dts_of(0), vec![0, 1024]);
        assert_eq!(cursors.last_committed(0), Some(1024));
    }

    #[test]
    fn second_clip_reanchors_one_past_committed() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        cursors.commit(0, 48000);
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        // clip restarts its own timeline at zero
        let mut source = audio_source(48000);
        source.push(pkt(Some(0), Some(0), 1024));
        source.push(pkt(Some(1024), Some(1024), 1024));

        let stats = ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        assert_eq!(stats.first_dts, Some(48001));
        assert_eq!(sink.dts_of(0), vec![48001, 49025]);
    }

    #[test]
    fn rebases_between_time_bases() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        // output counts in milliseconds
        let outputs = [OutputStream {
            kind: MediaKind::Audio,
            time_base: TimeBase::new(1, 1000),
            params: CodecParams::audio("pcm_s16le", 48000, 2),
        }];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(48000), Some(48000), 480));

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        // 48000 samples = 1000 ms, re-anchored to 0; 480 samples = 10 ms
        assert_eq!(sink.packets[0].dts, 0);
        assert_eq!(sink.packets[0].duration, 10);
    }

    #[test]
    fn missing_dts_is_synthesized() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(0), Some(0), 100));
        source.push(pkt(None, None, 100));
        source.push(pkt(None, None, 100));

        let stats = ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        assert_eq!(sink.dts_of(0), vec![0, 1, 2]);
        assert_eq!(stats.corrected, 2);
        // synthesized packets get pts == dts
        assert_eq!(sink.packets[1].pts, 1);
    }

    #[test]
    fn backward_dts_is_clamped_forward() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(1000), Some(1000), 100));
        source.push(pkt(Some(500), Some(500), 100)); // reordered inside the clip
        source.push(pkt(Some(2000), Some(2000), 100));

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        // first packet anchors 1000 -> 0; 500 would land at -500, clamped
        assert_eq!(sink.dts_of(0), vec![0, 1, 1000]);
    }

    #[test]
    fn backward_negative_dts_still_clamps_forward() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(500), Some(500), 100));
        source.push(pkt(Some(-900), Some(-900), 100));

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        // anchor 500 -> 0; the second packet shifts to -1400, but the
        // stream already committed 0, so the monotonic clamp wins
        assert_eq!(sink.dts_of(0), vec![0, 1]);
    }

    #[test]
    fn truly_negative_first_commit_clamps_to_zero() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        cursors.declare();
        let outputs = [audio_output(48000), audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = MemorySource::new(vec![
            SourceStream {
                kind: MediaKind::Audio,
                time_base: TimeBase::hz(48000),
                params: CodecParams::audio("pcm_s16le", 48000, 2),
            },
            SourceStream {
                kind: MediaKind::Audio,
                time_base: TimeBase::hz(48000),
                params: CodecParams::audio("pcm_s16le", 48000, 2),
            },
        ]);
        // anchor on stream 0 at 1000 -> offset = -1000
        source.push(pkt(Some(1000), Some(1000), 100));
        // stream 1's first packet predates the anchor: 200 - 1000 = -800
        let mut early = pkt(Some(200), Some(200), 100);
        early.stream = 1;
        source.push(early);

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0), Some(1)], &outputs, &mut sink)
            .unwrap();

        assert_eq!(sink.dts_of(0), vec![0]);
        assert_eq!(sink.dts_of(1), vec![0]);
    }

    #[test]
    fn pts_never_precedes_dts() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(Some(100), Some(50), 100));

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        let p = &sink.packets[0];
        assert!(p.pts >= p.dts);
        assert_eq!(p.pts, p.dts);
    }

    #[test]
    fn unmapped_streams_are_skipped_silently() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = MemorySource::new(vec![
            SourceStream {
                kind: MediaKind::Audio,
                time_base: TimeBase::hz(48000),
                params: CodecParams::audio("pcm_s16le", 48000, 2),
            },
            SourceStream {
                kind: MediaKind::Video,
                time_base: TimeBase::new(1, 90000),
                params: CodecParams::video("h264", 640, 480),
            },
        ]);
        source.push(pkt(Some(0), Some(0), 100));
        let mut video = pkt(Some(0), Some(0), 3000);
        video.stream = 1;
        source.push(video);

        let stats = ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0), None], &outputs, &mut sink)
            .unwrap();

        assert_eq!(stats.packets_written, 1);
        assert_eq!(stats.packets_skipped, 1);
    }

    #[test]
    fn write_failure_aborts_and_preserves_cursor() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();
        sink.fail_after = Some(2);

        let mut source = audio_source(48000);
        for i in 0..5 {
            source.push(pkt(Some(i * 100), Some(i * 100), 100));
        }

        let err = ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap_err();
        assert!(matches!(err, SessionError::Sink(_)));

        // two packets committed, cursor stops at the last success
        assert_eq!(sink.packets.len(), 2);
        assert_eq!(cursors.last_committed(0), Some(100));
    }

    #[test]
    fn dtsless_call_anchors_on_target_start() {
        let mut cursors = CursorTable::new();
        cursors.declare();
        cursors.commit(0, 999);
        let outputs = [audio_output(48000)];
        let mut sink = MemorySink::new();

        let mut source = audio_source(48000);
        source.push(pkt(None, None, 100));
        source.push(pkt(Some(2), Some(2), 100));

        ContinuityEngine::new(&mut cursors)
            .splice(&mut source, &[Some(0)], &outputs, &mut sink)
            .unwrap();

        // synthesized to 1000; the offset stays the raw target start, so
        // the second packet lands at 1000 + 2 = 1002
        assert_eq!(sink.dts_of(0), vec![1000, 1002]);
    }
}
