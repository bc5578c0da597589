//! Weft: continuous media splicing
//!
//! Weft stitches independently-recorded, independently-timed media clips
//! (and synthesized silence) into one continuously growing segmented
//! output without ever restarting the output timeline. A caller opens a
//! session, appends clips or silence any number of times, and finishes
//! the session; between calls the session survives as an ordinary owned
//! value or as an opaque id in a [`SessionManager`].
//!
//! The heart of the crate is the [`engine::ContinuityEngine`]: every
//! input clip restarts its own timestamps at (or near) zero, so packets
//! are rebased into the output stream's time base, shifted so the clip
//! lands one tick past everything already committed, and clamped so the
//! committed decode timeline stays strictly increasing per stream.
//! Silence takes exactly the same path as a real clip; it only differs
//! at the source layer.
//!
//! Where media actually comes from and goes to is behind two seams:
//!
//! - [`source::MediaSource`] - yields packets in the clip's own time
//!   base. [`source::ClipSource`] reads WAV files (and MP3/FLAC when the
//!   `symphonia-decode` feature is enabled); [`silence::SilenceSource`]
//!   synthesizes silence through an encoder pipeline.
//! - [`sink::MediaSink`] - declares output streams, then accepts header,
//!   packets, and trailer. The `weft-hls` crate provides the segmented
//!   playlist implementation; [`sink::MemorySink`] backs tests.

pub mod cursor;
pub mod engine;
pub mod error;
pub mod packet;
pub mod session;
pub mod silence;
pub mod sink;
pub mod source;
pub mod timebase;

pub use cursor::CursorTable;
pub use engine::{ContinuityEngine, OutputStream, SpliceStats};
pub use error::{SessionError, SinkError, SourceError};
pub use packet::{CodecParams, MediaKind, Packet, SourcePacket, SourceStream};
pub use session::{AppendReport, Session, SessionId, SessionManager};
pub use silence::{AudioEncoder, EncodedPacket, PcmEncoder, SilenceSource};
pub use sink::{MediaSink, MemorySink, SinkOptions};
pub use source::{ClipSource, MediaSource, MemorySource};
pub use timebase::TimeBase;
