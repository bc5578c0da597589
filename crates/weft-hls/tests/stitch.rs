//! End-to-end: real WAV clips through a session into a segmented
//! playlist on disk, verified by reading the segments back.

use std::fs;
use std::path::Path;

use weft::{Session, SessionManager, SinkOptions, SessionError};
use weft_hls::{SegmentReader, SegmentedSink};

fn write_wav(path: &Path, frames: u32, rate: u32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let v = ((i % 100) as i16) * 8;
        writer.write_sample(v).unwrap();
        writer.write_sample(-v).unwrap();
    }
    writer.finalize().unwrap();
}

fn options() -> SinkOptions {
    SinkOptions {
        segment_seconds: 1.0,
        start_number: 0,
        segment_template: "seg_%03d.ts".into(),
    }
}

#[test]
fn two_clips_and_silence_form_one_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let clip_a = dir.path().join("a.wav");
    let clip_b = dir.path().join("b.wav");
    write_wav(&clip_a, 48000, 48000); // 1 s
    write_wav(&clip_b, 24000, 48000); // 0.5 s

    let playlist = dir.path().join("out.m3u8");
    let sink = SegmentedSink::create(&playlist).unwrap();
    let mut session = Session::start(Box::new(sink), options());

    let a = session.append(&clip_a).unwrap();
    let silence = session.insert_silence(0.25).unwrap();
    let b = session.append(&clip_b).unwrap();
    session.finish().unwrap();

    // each call starts one past the previous call's last commit
    assert_eq!(a.first_dts, Some(0));
    assert_eq!(silence.first_dts, Some(a.last_dts.unwrap() + 1));
    assert_eq!(b.first_dts, Some(silence.last_dts.unwrap() + 1));

    // playlist is closed and indexes every produced segment
    let text = fs::read_to_string(&playlist).unwrap();
    assert!(text.contains("#EXT-X-ENDLIST"));
    let segment_names: Vec<&str> = text
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    assert!(!segment_names.is_empty());

    // concatenating the segments yields one strictly increasing
    // decode timeline
    let mut last_dts = None;
    let mut total_frames = 0i64;
    for name in segment_names {
        let mut reader = SegmentReader::open(dir.path().join(name)).unwrap();
        while let Some(p) = reader.next_packet().unwrap() {
            if let Some(prev) = last_dts {
                assert!(p.dts > prev, "dts {} does not follow {}", p.dts, prev);
            }
            assert!(p.pts >= p.dts);
            last_dts = Some(p.dts);
            total_frames += p.duration;
        }
    }
    // 1 s + 0.25 s + 0.5 s of 48 kHz audio
    assert_eq!(total_frames, 48000 + 12000 + 24000);
}

#[test]
fn finished_output_cannot_be_reopened_or_appended() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.wav");
    write_wav(&clip, 4800, 48000);
    let playlist = dir.path().join("out.m3u8");

    let mut manager = SessionManager::new();
    let sink = SegmentedSink::create(&playlist).unwrap();
    let id = manager.start(Box::new(sink), options());

    manager.append(id, &clip).unwrap();
    manager.finish(id).unwrap();

    // the handle is dead
    let err = manager.append(id, &clip).unwrap_err();
    assert!(matches!(err, SessionError::InvalidSession));

    // and so is the target
    let err = SegmentedSink::create(&playlist).unwrap_err();
    assert!(matches!(err, weft::SinkError::Closed { .. }));
}

#[test]
fn append_failure_leaves_target_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.wav");
    write_wav(&clip, 9600, 48000);
    let playlist = dir.path().join("out.m3u8");

    let sink = SegmentedSink::create(&playlist).unwrap();
    let mut session = Session::start(Box::new(sink), options());

    session.append(&clip).unwrap();
    let before = session.cursors().last_committed(0);

    let err = session.append(dir.path().join("missing.wav")).unwrap_err();
    assert!(matches!(err, SessionError::Source(_)));
    assert_eq!(session.cursors().last_committed(0), before);

    // a fresh append still lands cleanly after the failure
    let report = session.append(&clip).unwrap();
    assert_eq!(report.first_dts, Some(before.unwrap() + 1));
    session.finish().unwrap();
}
