//! Session lifecycle: start, append, insert silence, finish.
//!
//! A [`Session`] owns the output sink, the declared output stream set,
//! and the cursor table, and survives between calls as an ordinary
//! owned value. Output streams are declared exactly once, from the
//! first appended clip's streams (one per media kind), immediately
//! before the header is written; every later clip is mapped onto that
//! fixed set by kind, and clips with extra kinds simply have those
//! streams skipped.
//!
//! Callers that need an opaque, copyable handle (FFI embeddings, job
//! queues) hold sessions in a [`SessionManager`], which maps a
//! [`SessionId`] to the live session and answers every operation on a
//! finished or unknown id with [`SessionError::InvalidSession`].
//!
//! Sessions are single-owner and synchronous: every call runs to
//! completion on the calling thread, and distinct sessions share no
//! state whatsoever.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cursor::CursorTable;
use crate::engine::{ContinuityEngine, OutputStream, SpliceStats};
use crate::error::SessionError;
use crate::packet::{MediaKind, SourceStream};
use crate::silence::SilenceSource;
use crate::sink::{MediaSink, SinkOptions};
use crate::source::{ClipSource, MediaSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Output opened, no streams declared yet.
    Created,
    /// Streams declared and header written; appendable.
    Declared,
    /// Declaration failed; only teardown is allowed.
    Poisoned,
}

/// What one append or silence call did. `Display` gives the
/// human-readable status line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendReport {
    pub packets_written: u64,
    pub packets_skipped: u64,
    /// Packets whose timestamps needed correction.
    pub corrected: u64,
    pub first_dts: Option<i64>,
    pub last_dts: Option<i64>,
}

impl From<SpliceStats> for AppendReport {
    fn from(stats: SpliceStats) -> Self {
        Self {
            packets_written: stats.packets_written,
            packets_skipped: stats.packets_skipped,
            corrected: stats.corrected,
            first_dts: stats.first_dts,
            last_dts: stats.last_dts,
        }
    }
}

impl fmt::Display for AppendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.packets_written == 0 {
            return write!(f, "nothing appended");
        }
        write!(f, "appended {} packets", self.packets_written)?;
        if self.packets_skipped > 0 {
            write!(f, " ({} skipped)", self.packets_skipped)?;
        }
        if self.corrected > 0 {
            write!(f, " ({} corrected)", self.corrected)?;
        }
        if let Some(last) = self.last_dts {
            write!(f, ", timeline at dts {last}")?;
        }
        Ok(())
    }
}

/// One long-lived splicing session. See the module docs for the
/// lifecycle; construction happens via [`Session::start`] with an
/// already-opened sink.
pub struct Session {
    sink: Box<dyn MediaSink>,
    options: SinkOptions,
    state: SessionState,
    outputs: Vec<OutputStream>,
    cursors: CursorTable,
}

impl Session {
    /// Begin a session on an opened (but not yet header-written) sink.
    ///
    /// Opening the target - and refusing one that is no longer
    /// appendable - is the sink constructor's job, so a failure there
    /// never allocates session state.
    pub fn start(sink: Box<dyn MediaSink>, options: SinkOptions) -> Self {
        info!(
            segment_seconds = options.segment_seconds,
            start_number = options.start_number,
            template = %options.segment_template,
            "session started"
        );
        Self {
            sink,
            options,
            state: SessionState::Created,
            outputs: Vec::new(),
            cursors: CursorTable::new(),
        }
    }

    /// Append one clip from disk. Each call advances the timeline;
    /// appending the same path twice writes two copies, the second one
    /// later.
    pub fn append(&mut self, clip: impl AsRef<Path>) -> Result<AppendReport, SessionError> {
        let clip = clip.as_ref();
        if self.state == SessionState::Poisoned {
            return Err(SessionError::Poisoned);
        }

        let mut source = ClipSource::open(clip)?;
        let report = self.append_source(&mut source)?;
        info!(clip = %clip.display(), %report, "clip appended");
        Ok(report)
    }

    /// Append from any source. This is the whole append path minus the
    /// file open; [`append`](Self::append) and silence insertion both
    /// funnel into it.
    pub fn append_source(
        &mut self,
        source: &mut dyn MediaSource,
    ) -> Result<AppendReport, SessionError> {
        if self.state == SessionState::Poisoned {
            return Err(SessionError::Poisoned);
        }
        // declaration waits for the first source that actually exposes
        // streams; a streamless source cannot describe the output
        if self.state == SessionState::Created && !source.streams().is_empty() {
            self.declare_streams(source.streams())?;
        }

        let mapping = self.map_streams(source.streams());
        let stats = ContinuityEngine::new(&mut self.cursors).splice(
            source,
            &mapping,
            &self.outputs,
            &mut *self.sink,
        )?;
        Ok(stats.into())
    }

    /// Splice `seconds` of synthesized silence onto the audio stream.
    ///
    /// Requires declared streams (there is nothing to describe the
    /// silence before the first clip) and an audio output stream.
    /// Non-positive durations are a success no-op.
    pub fn insert_silence(&mut self, seconds: f64) -> Result<AppendReport, SessionError> {
        match self.state {
            SessionState::Poisoned => return Err(SessionError::Poisoned),
            SessionState::Created => return Err(SessionError::SilenceBeforeStreams),
            SessionState::Declared => {}
        }
        if seconds <= 0.0 {
            debug!(seconds, "non-positive silence duration; nothing to insert");
            return Ok(AppendReport::default());
        }

        let audio = self
            .outputs
            .iter()
            .position(|o| o.kind == MediaKind::Audio)
            .ok_or(SessionError::NoAudioStream)?;
        let (sample_rate, channels) = {
            let params = &self.outputs[audio].params;
            (params.sample_rate, params.channels)
        };

        let mut source = SilenceSource::pcm(sample_rate, channels, seconds);
        let mapping = vec![Some(audio)];
        let stats = ContinuityEngine::new(&mut self.cursors).splice(
            &mut source,
            &mapping,
            &self.outputs,
            &mut *self.sink,
        )?;
        info!(seconds, written = stats.packets_written, "silence spliced");
        Ok(stats.into())
    }

    /// Close the session: write the trailer if a header was ever
    /// written, then release everything. Consumes the session, so a
    /// second finish on a directly-owned value cannot compile; registry
    /// handles get [`SessionError::InvalidSession`] instead.
    pub fn finish(mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Declared => {
                if let Err(e) = self.sink.write_trailer() {
                    warn!(error = %e, "trailer write failed; resources released anyway");
                    return Err(e.into());
                }
                info!("session finished; output closed");
            }
            SessionState::Created | SessionState::Poisoned => {
                debug!("no header was written; skipping trailer");
            }
        }
        Ok(())
    }

    /// Declared output streams, empty until the first append.
    pub fn streams(&self) -> &[OutputStream] {
        &self.outputs
    }

    /// The per-stream commit cursors.
    pub fn cursors(&self) -> &CursorTable {
        &self.cursors
    }

    pub fn header_written(&self) -> bool {
        self.state == SessionState::Declared
    }

    /// One-time output declaration from the first clip: one output
    /// stream per media kind present, video first, then the header.
    fn declare_streams(&mut self, streams: &[SourceStream]) -> Result<(), SessionError> {
        debug_assert!(self.outputs.is_empty());

        for kind in [MediaKind::Video, MediaKind::Audio] {
            let Some(stream) = streams.iter().find(|s| s.kind == kind) else {
                continue;
            };
            let index = match self.sink.declare_stream(&stream.params, stream.time_base) {
                Ok(index) => index,
                Err(e) => {
                    self.state = SessionState::Poisoned;
                    return Err(e.into());
                }
            };
            debug_assert_eq!(index, self.outputs.len());
            self.outputs.push(OutputStream {
                kind,
                time_base: stream.time_base,
                params: stream.params.clone(),
            });
            self.cursors.declare();
            debug!(
                kind = kind.as_str(),
                codec = %stream.params.codec,
                time_base = %stream.time_base,
                "output stream declared"
            );
        }

        if let Err(e) = self.sink.write_header(&self.options) {
            warn!(error = %e, "header write failed; session is teardown-only");
            self.state = SessionState::Poisoned;
            return Err(e.into());
        }
        self.state = SessionState::Declared;
        info!(streams = self.outputs.len(), "header written");
        Ok(())
    }

    /// Per-call mapping: each source stream goes to the output stream
    /// of its kind, or nowhere.
    fn map_streams(&self, streams: &[SourceStream]) -> Vec<Option<usize>> {
        streams
            .iter()
            .map(|s| self.outputs.iter().position(|o| o.kind == s.kind))
            .collect()
    }
}

/// Opaque session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry of live sessions keyed by opaque id, for callers that
/// cannot hold the session value directly. Finishing removes the entry,
/// so every later call on that id reports an invalid session instead of
/// touching freed state.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, sink: Box<dyn MediaSink>, options: SinkOptions) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, Session::start(sink, options));
        info!(session = %id, "session registered");
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn append(
        &mut self,
        id: SessionId,
        clip: impl AsRef<Path>,
    ) -> Result<AppendReport, SessionError> {
        self.session_mut(id)?.append(clip)
    }

    pub fn insert_silence(
        &mut self,
        id: SessionId,
        seconds: f64,
    ) -> Result<AppendReport, SessionError> {
        self.session_mut(id)?.insert_silence(seconds)
    }

    pub fn finish(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or(SessionError::InvalidSession)?;
        session.finish()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(&id)
            .ok_or(SessionError::InvalidSession)
    }
}
