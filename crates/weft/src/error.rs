//! Error taxonomy.
//!
//! Every failure is a value returned to the immediate caller; nothing
//! here aborts the process. Timestamp problems are deliberately absent:
//! non-monotonic or missing timestamps are always corrected in place by
//! the continuity engine, never surfaced, because rejecting them would
//! silently drop media.

use std::path::PathBuf;

use thiserror::Error;

/// Failures opening or reading a clip source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not open input {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("no usable streams in {path}")]
    NoStreams { path: PathBuf },

    #[error("unsupported clip format for {path}")]
    Unsupported { path: PathBuf },

    #[error("error reading {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Failures at the output target.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not create output target {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output {path} is no longer appendable")]
    Closed { path: PathBuf },

    #[error("invalid segment name template {template:?}: {message}")]
    Template { template: String, message: String },

    #[error("header write failed: {message}")]
    Header { message: String },

    #[error("packet write failed: {message}")]
    Write { message: String },

    #[error("trailer write failed: {message}")]
    Trailer { message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The handle does not name a live session (already finished, or
    /// never existed).
    #[error("invalid session handle")]
    InvalidSession,

    /// A header write failed earlier; the session can only be finished.
    #[error("session is unusable after a failed header write")]
    Poisoned,

    /// Silence was requested before any clip declared the output streams.
    #[error("cannot insert silence before any streams are declared")]
    SilenceBeforeStreams,

    /// Silence was requested but the output carries no audio stream.
    #[error("no audio output stream to carry silence")]
    NoAudioStream,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
