use std::collections::HashMap;

use crate::format::LineRecord;
use crate::minimap::SampleRow;

/// Marker opening a collapsible group; stripped from display text
pub const GROUP_OPEN: &str = "##[group]";
/// Marker closing the most recently opened group; stripped from display text
pub const GROUP_CLOSE: &str = "##[endgroup]";

/// Fold/unfold moves at most this many lines per step, so a huge group never
/// blocks the worker for one long stretch.
pub const FOLD_SLICE: usize = 10_000;

/// Outcome of one bounded fold/unfold step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldStep {
    /// The toggle finished; the new active line count is attached
    Done(usize),
    /// More slices remain; call again
    More,
}

/// Per-stream line state: the active (displayable) sequence plus group
/// bookkeeping. Owned exclusively by the store worker.
#[derive(Default)]
struct StreamState {
    /// Active sequence; `index` values are strictly increasing
    lines: Vec<LineRecord>,
    /// Stack of open group line indexes, last-opened first-closed
    pending_groups: Vec<u64>,
}

impl StreamState {
    /// Position of a real index within the active sequence
    fn position_of(&self, index: u64) -> Option<usize> {
        self.lines.binary_search_by_key(&index, |l| l.index).ok()
    }

    /// Reassign `display_index` as a dense 0..N-1 renumbering
    fn renumber(&mut self) {
        for (i, line) in self.lines.iter_mut().enumerate() {
            line.display_index = i;
        }
    }
}

/// Owns the full ordered line collection per log stream, applies formatter
/// output, maintains the fold structure, and answers range queries.
#[derive(Default)]
pub struct LogStore {
    streams: HashMap<String, StreamState>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate empty state for each stream id
    pub fn init(&mut self, stream_ids: &[String]) {
        for id in stream_ids {
            self.streams.entry(id.clone()).or_default();
        }
    }

    /// Clear a stream's active sequence and pending-group bookkeeping
    pub fn reset(&mut self, stream_id: &str) {
        if let Some(stream) = self.streams.get_mut(stream_id) {
            stream.lines.clear();
            stream.pending_groups.clear();
        }
    }

    /// Active line count for a stream (folded lines excluded)
    pub fn total_count(&self, stream_id: &str) -> usize {
        self.streams.get(stream_id).map_or(0, |s| s.lines.len())
    }

    /// Stream ids with allocated state, in no particular order
    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Active sequence of a stream, for search scans
    pub fn lines(&self, stream_id: &str) -> Option<&[LineRecord]> {
        self.streams.get(stream_id).map(|s| s.lines.as_slice())
    }

    /// Append formatted lines to a stream's active sequence, detecting group
    /// markers. Returns the new active line count.
    pub fn append(&mut self, stream_id: &str, lines: Vec<LineRecord>) -> usize {
        let stream = self.streams.entry(stream_id.to_string()).or_default();

        for mut line in lines {
            if let Some(rest) = line.message.strip_prefix(GROUP_OPEN) {
                line.message = rest.to_string();
                line.fold_start = true;
                stream.pending_groups.push(line.index);
            } else if let Some(rest) = line.message.strip_prefix(GROUP_CLOSE) {
                line.message = rest.to_string();
                match stream.pending_groups.pop() {
                    Some(open_index) => {
                        let close_index = line.index;
                        if let Some(pos) = stream.position_of(open_index) {
                            stream.lines[pos].fold_end = Some(close_index);
                        }
                    }
                    // Unmatched close: keep the line, marker already stripped.
                    None => tracing::debug!(stream_id, index = line.index, "unmatched group close"),
                }
            }
            stream.lines.push(line);
        }

        stream.renumber();
        stream.lines.len()
    }

    /// Toggle the group at `start_index`, performing all bounded slices in one
    /// call. Returns the new active line count.
    pub fn fold(&mut self, stream_id: &str, start_index: u64) -> usize {
        loop {
            if let FoldStep::Done(total) = self.fold_step(stream_id, start_index) {
                return total;
            }
        }
    }

    /// One bounded slice of a fold/unfold toggle.
    ///
    /// Collapsing moves lines strictly between the group's open and close
    /// lines into the open line's `children`; expanding splices them back in
    /// original order. Repeated toggling restores the exact original
    /// sequence. A nonexistent index, or an open line with no matching close
    /// and nothing collapsed, is a no-op.
    pub fn fold_step(&mut self, stream_id: &str, start_index: u64) -> FoldStep {
        let Some(stream) = self.streams.get_mut(stream_id) else {
            return FoldStep::Done(0);
        };
        let Some(pos) = stream.position_of(start_index) else {
            tracing::debug!(stream_id, start_index, "fold target not in active sequence");
            return FoldStep::Done(stream.lines.len());
        };

        if stream.lines[pos].is_folded() {
            Self::unfold_slice(stream, pos)
        } else {
            Self::collapse_slice(stream, pos)
        }
    }

    fn collapse_slice(stream: &mut StreamState, pos: usize) -> FoldStep {
        let Some(fold_end) = stream.lines[pos].fold_end else {
            // Unmatched open: the group has no effective end.
            return FoldStep::Done(stream.lines.len());
        };

        // Lines strictly between the open and close lines belong to the group.
        let first = pos + 1;
        let mut last = first;
        while last < stream.lines.len()
            && stream.lines[last].index < fold_end
            && last - first < FOLD_SLICE
        {
            last += 1;
        }

        if first == last {
            stream.lines[pos].collapsed = !stream.lines[pos].children.is_empty();
            stream.renumber();
            return FoldStep::Done(stream.lines.len());
        }

        let moved: Vec<LineRecord> = stream.lines.drain(first..last).collect();
        stream.lines[pos].children.extend(moved);
        stream.lines[pos].collapsed = true;

        let more = stream
            .lines
            .get(pos + 1)
            .is_some_and(|next| next.index < fold_end);
        if more {
            FoldStep::More
        } else {
            stream.renumber();
            FoldStep::Done(stream.lines.len())
        }
    }

    fn unfold_slice(stream: &mut StreamState, pos: usize) -> FoldStep {
        let take = stream.lines[pos].children.len().min(FOLD_SLICE);
        let chunk: Vec<LineRecord> = stream.lines[pos].children.drain(..take).collect();
        let done = stream.lines[pos].children.is_empty();

        // Re-splice in original order: everything already restored has a
        // smaller index than the chunk's first line, everything after the
        // group has a larger one.
        let insert_at = match chunk.first() {
            Some(first) => stream
                .lines
                .partition_point(|l| l.index < first.index),
            None => pos + 1,
        };
        stream.lines.splice(insert_at..insert_at, chunk);

        if done {
            stream.lines[pos].collapsed = false;
            stream.renumber();
            FoldStep::Done(stream.lines.len())
        } else {
            FoldStep::More
        }
    }

    /// Clone the active lines in `[start, start+count)` for the renderer,
    /// with `children` elided to keep the transfer small.
    pub fn slice(&self, stream_id: &str, start: usize, count: usize) -> Vec<LineRecord> {
        let Some(stream) = self.streams.get(stream_id) else {
            return Vec::new();
        };
        let start = start.min(stream.lines.len());
        let end = start.saturating_add(count).min(stream.lines.len());
        stream.lines[start..end]
            .iter()
            .map(LineRecord::view_clone)
            .collect()
    }

    /// Coarse per-line style rows for the minimap sampling window
    pub fn sample(&self, stream_id: &str, start: usize, count: usize) -> Vec<SampleRow> {
        let Some(stream) = self.streams.get(stream_id) else {
            return Vec::new();
        };
        let start = start.min(stream.lines.len());
        let end = start.saturating_add(count).min(stream.lines.len());
        stream.lines[start..end]
            .iter()
            .map(|l| SampleRow {
                severity: l.severity,
                bold: l.bold,
                width: l.message.chars().count(),
            })
            .collect()
    }

    /// Current position of a real index within the active sequence, if it is
    /// not hidden inside a fold
    pub fn display_position(&self, stream_id: &str, index: u64) -> Option<usize> {
        self.streams.get(stream_id)?.position_of(index)
    }
}
