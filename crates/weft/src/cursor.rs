//! Per-stream cursor table: the last decode timestamp committed to the
//! output, per declared output stream.
//!
//! The table is the only state that survives between append calls, and
//! it only moves forward: a cursor is updated after - and only after -
//! a packet write succeeds, so a failed call leaves the timeline exactly
//! where the last successful write put it.

#[derive(Debug, Clone, Default)]
pub struct CursorTable {
    last_dts: Vec<Option<i64>>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cursor for a newly declared output stream; returns its index.
    pub fn declare(&mut self) -> usize {
        self.last_dts.push(None);
        self.last_dts.len() - 1
    }

    pub fn len(&self) -> usize {
        self.last_dts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_dts.is_empty()
    }

    /// Last committed DTS for `stream`, if it has ever committed.
    pub fn last_committed(&self, stream: usize) -> Option<i64> {
        self.last_dts.get(stream).copied().flatten()
    }

    /// Record a successful write. Cursors never move backwards.
    pub fn commit(&mut self, stream: usize, dts: i64) {
        let slot = &mut self.last_dts[stream];
        debug_assert!(
            slot.map_or(true, |last| dts >= last),
            "cursor for stream {stream} moved backwards: {slot:?} -> {dts}"
        );
        *slot = Some(dts);
    }

    /// Max committed DTS across all streams, if any stream has committed.
    pub fn max_committed(&self) -> Option<i64> {
        self.last_dts.iter().copied().flatten().max()
    }

    /// Target DTS for the next appended clip's first packet: one past
    /// everything committed so far, or 0 on a virgin table.
    pub fn next_start(&self) -> i64 {
        self.max_committed().map_or(0, |dts| dts + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virgin_table_starts_at_zero() {
        let mut table = CursorTable::new();
        assert!(table.is_empty());
        assert_eq!(table.next_start(), 0);

        let s = table.declare();
        assert_eq!(s, 0);
        assert_eq!(table.last_committed(s), None);
        assert_eq!(table.next_start(), 0);
    }

    #[test]
    fn next_start_is_one_past_max() {
        let mut table = CursorTable::new();
        let a = table.declare();
        let v = table.declare();

        table.commit(a, 48000);
        table.commit(v, 1500);
        assert_eq!(table.max_committed(), Some(48000));
        assert_eq!(table.next_start(), 48001);
    }

    #[test]
    fn commit_tracks_per_stream() {
        let mut table = CursorTable::new();
        let a = table.declare();
        let v = table.declare();

        table.commit(a, 10);
        assert_eq!(table.last_committed(a), Some(10));
        assert_eq!(table.last_committed(v), None);

        table.commit(a, 11);
        table.commit(v, 3);
        assert_eq!(table.last_committed(a), Some(11));
        assert_eq!(table.last_committed(v), Some(3));
    }

    #[test]
    fn unknown_stream_has_no_cursor() {
        let table = CursorTable::new();
        assert_eq!(table.last_committed(5), None);
    }
}
