//! Event playlist: the growing index of finished segments.
//!
//! The playlist is rewritten in full after every change - it is small,
//! and a full rewrite keeps partially-appended states off disk. An
//! existing playlist is parsed and extended rather than clobbered, so a
//! process can resume appending to yesterday's output; one that already
//! carries the end marker is refused, because a closed output can never
//! become appendable again.

use std::fs;
use std::path::{Path, PathBuf};

use weft::{SinkError, SinkOptions};

const END_MARKER: &str = "#EXT-X-ENDLIST";

/// One finished segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub duration: f64,
    pub uri: String,
}

/// An append-aware event playlist bound to one file on disk.
#[derive(Debug)]
pub struct Playlist {
    path: PathBuf,
    target_duration: u64,
    media_sequence: u64,
    entries: Vec<SegmentEntry>,
    ended: bool,
}

impl Playlist {
    /// Parse an existing playlist or start an empty one.
    ///
    /// Fails with [`SinkError::Closed`] when the file already carries
    /// the end marker.
    pub fn load_or_new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                target_duration: 0,
                media_sequence: 0,
                entries: Vec::new(),
                ended: false,
            });
        }

        let contents = fs::read_to_string(path).map_err(|e| SinkError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut playlist = Self::parse(path, &contents);
        if playlist.ended {
            return Err(SinkError::Closed {
                path: path.to_path_buf(),
            });
        }
        playlist.path = path.to_path_buf();
        Ok(playlist)
    }

    fn parse(path: &Path, contents: &str) -> Self {
        let mut playlist = Self {
            path: path.to_path_buf(),
            target_duration: 0,
            media_sequence: 0,
            entries: Vec::new(),
            ended: false,
        };

        let mut pending: Option<f64> = None;
        for line in contents.lines() {
            let line = line.trim();
            if line == END_MARKER {
                playlist.ended = true;
            } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = rest.parse().unwrap_or(0);
            } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = rest.parse().unwrap_or(0);
            } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
                let duration = rest.trim_end_matches(',').parse().unwrap_or(0.0);
                pending = Some(duration);
            } else if !line.is_empty() && !line.starts_with('#') {
                if let Some(duration) = pending.take() {
                    playlist.entries.push(SegmentEntry {
                        duration,
                        uri: line.to_string(),
                    });
                }
            }
        }
        playlist
    }

    /// Apply session options and persist the (possibly empty) playlist.
    /// Called once, at header-write time.
    pub fn prepare(&mut self, options: &SinkOptions) -> Result<(), SinkError> {
        if self.entries.is_empty() {
            self.media_sequence = options.start_number;
        }
        let target = options.segment_seconds.ceil() as u64;
        self.target_duration = self.target_duration.max(target.max(1));
        self.write()
            .map_err(|e| SinkError::Header { message: e.to_string() })
    }

    /// Record one finished segment and persist.
    pub fn add_entry(&mut self, duration: f64, uri: impl Into<String>) -> Result<(), SinkError> {
        self.entries.push(SegmentEntry {
            duration,
            uri: uri.into(),
        });
        self.write()
    }

    /// Write the end marker; the output is closed for good.
    pub fn finalize(&mut self) -> Result<(), SinkError> {
        self.ended = true;
        self.write()
            .map_err(|e| SinkError::Trailer { message: e.to_string() })
    }

    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        out.push_str("#EXT-X-PLAYLIST-TYPE:EVENT\n");
        for entry in &self.entries {
            out.push_str(&format!("#EXTINF:{:.6},\n", entry.duration));
            out.push_str(&entry.uri);
            out.push('\n');
        }
        if self.ended {
            out.push_str(END_MARKER);
            out.push('\n');
        }
        out
    }

    fn write(&self) -> Result<(), SinkError> {
        fs::write(&self.path, self.render()).map_err(|e| SinkError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}
