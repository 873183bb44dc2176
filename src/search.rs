use regex::{Regex, RegexBuilder};

use crate::format::LineRecord;
use crate::store::LogStore;

/// Match windows carry at most this many entries
pub const MATCH_WINDOW: usize = 1000;
/// Entries kept on each side of the pivot
const WINDOW_HALF: usize = MATCH_WINDOW / 2;
/// Navigation requests a fresh window when the position drifts within this
/// many entries of either window boundary
const REFRESH_MARGIN: usize = 20;

/// A pointer to one search hit, resolved against a stream's active sequence
/// (or a still-folded ancestor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRef {
    /// Stream the hit belongs to
    pub stream_id: String,
    /// Original index of the matched line (the fold's open line for hidden hits)
    pub real_index: u64,
    /// Position within the stream's active sequence at build time
    pub display_index: usize,
    /// True when the hit is hidden inside a collapsed group
    pub in_fold: bool,
    /// Open-line index of the enclosing fold, so the viewer can
    /// unfold-then-scroll
    pub fold_start: Option<u64>,
}

/// All hits for one query, in stream-list order then line order.
pub struct SearchIndex {
    query: String,
    matches: Vec<MatchRef>,
}

impl SearchIndex {
    /// Build the match list. The query is literal text: regex metacharacters
    /// are escaped and matching is case-insensitive. An empty query yields an
    /// empty index.
    pub fn build(store: &LogStore, stream_ids: &[String], query: &str) -> Self {
        let mut matches = Vec::new();
        if query.is_empty() {
            return Self {
                query: String::new(),
                matches,
            };
        }

        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .expect("escaped query is a valid pattern");

        for stream_id in stream_ids {
            let Some(lines) = store.lines(stream_id) else {
                continue;
            };
            for line in lines {
                if pattern.is_match(&line.message) {
                    matches.push(MatchRef {
                        stream_id: stream_id.clone(),
                        real_index: line.index,
                        display_index: line.display_index,
                        in_fold: false,
                        fold_start: None,
                    });
                } else if line.is_folded() && any_descendant_matches(&line.children, &pattern) {
                    // Hidden hits collapse to a single flagged entry pointing
                    // at the fold's open line.
                    matches.push(MatchRef {
                        stream_id: stream_id.clone(),
                        real_index: line.index,
                        display_index: line.display_index,
                        in_fold: true,
                        fold_start: Some(line.index),
                    });
                }
            }
        }

        Self {
            query: query.to_string(),
            matches,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// A bounded window of matches centered on `pivot`, wrapping circularly
    /// when the list is shorter than the window or the window would run off
    /// either end.
    pub fn window(&self, pivot: usize) -> MatchWindow {
        let total = self.matches.len();
        if total == 0 {
            return MatchWindow {
                entries: Vec::new(),
                start: 0,
                pivot: 0,
                total: 0,
            };
        }
        let pivot = pivot.min(total - 1);

        if total <= MATCH_WINDOW {
            return MatchWindow {
                entries: self.matches.clone(),
                start: 0,
                pivot,
                total,
            };
        }

        let start = (pivot + total - WINDOW_HALF) % total;
        let entries = (0..MATCH_WINDOW)
            .map(|i| self.matches[(start + i) % total].clone())
            .collect();
        MatchWindow {
            entries,
            start,
            pivot,
            total,
        }
    }
}

fn any_descendant_matches(children: &[LineRecord], pattern: &Regex) -> bool {
    children
        .iter()
        .any(|c| pattern.is_match(&c.message) || any_descendant_matches(&c.children, pattern))
}

/// A transferable window into the global match list.
#[derive(Clone, Debug, Default)]
pub struct MatchWindow {
    /// Window entries, circular over the full list
    pub entries: Vec<MatchRef>,
    /// Absolute index of `entries[0]` in the full list
    pub start: usize,
    /// Absolute pivot the window was centered on
    pub pivot: usize,
    /// Full match count, for the "k of n" indicator
    pub total: usize,
}

impl MatchWindow {
    /// Offset of an absolute match index within the window, if covered
    fn offset_of(&self, abs: usize) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let offset = (abs + self.total - self.start) % self.total;
        (offset < self.entries.len()).then_some(offset)
    }

    pub fn entry(&self, abs: usize) -> Option<&MatchRef> {
        self.offset_of(abs).map(|o| &self.entries[o])
    }
}

/// Outcome of a navigation step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavOutcome {
    /// Moved to this absolute match index; the local window still covers it
    Moved(usize),
    /// Request a fresh window centered on this pivot before completing
    NeedWindow(usize),
}

/// Viewer-local cursor over the global match list, backed by a window.
///
/// Advancing past the last match wraps to the first and vice versa. When the
/// position drifts near a window boundary, the cursor asks for a re-centered
/// window instead of walking off the edge.
#[derive(Default)]
pub struct MatchCursor {
    window: MatchWindow,
    current: usize,
}

impl MatchCursor {
    pub fn new(window: MatchWindow) -> Self {
        let current = window.pivot;
        Self { window, current }
    }

    pub fn total(&self) -> usize {
        self.window.total
    }

    /// Absolute index of the current match (0-based)
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_ref(&self) -> Option<&MatchRef> {
        self.window.entry(self.current)
    }

    /// Replace the backing window after a refresh; the cursor jumps to the
    /// window's pivot.
    pub fn set_window(&mut self, window: MatchWindow) {
        self.current = window.pivot;
        self.window = window;
    }

    /// Step by `direction` (+1 next, -1 previous), wrapping at both ends.
    pub fn advance(&mut self, direction: i64) -> NavOutcome {
        let total = self.window.total;
        if total == 0 {
            return NavOutcome::Moved(0);
        }
        let next =
            ((self.current as i64 + direction).rem_euclid(total as i64)) as usize;

        match self.window.offset_of(next) {
            Some(offset)
                if self.window.entries.len() == total
                    || (offset >= REFRESH_MARGIN
                        && offset < self.window.entries.len() - REFRESH_MARGIN) =>
            {
                self.current = next;
                NavOutcome::Moved(next)
            }
            // Near a boundary or outside the window: re-center first.
            _ => NavOutcome::NeedWindow(next),
        }
    }

    /// Complete a navigation that required a window refresh.
    pub fn complete(&mut self, window: MatchWindow) -> usize {
        self.set_window(window);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ApproxMeasure, LineFormatter, RawChunk};
    use crate::store::LogStore;

    fn store_with(messages: &[&str]) -> LogStore {
        let mut f = LineFormatter::new(Box::new(ApproxMeasure::default()));
        let chunks: Vec<RawChunk> = messages
            .iter()
            .map(|m| RawChunk {
                message: m.to_string(),
                timestamp: None,
            })
            .collect();
        let mut store = LogStore::new();
        store.init(&["x".to_string()]);
        store.append(
            "x",
            f.format_chunks(&chunks, 8000).into_iter().flatten().collect(),
        );
        store
    }

    fn ids() -> Vec<String> {
        vec!["x".to_string()]
    }

    #[test]
    fn test_empty_query_is_empty_result() {
        let store = store_with(&["a", "b"]);
        let index = SearchIndex::build(&store, &ids(), "");
        assert!(index.is_empty());
    }

    #[test]
    fn test_match_count_equals_occurrence_count() {
        let store = store_with(&["alpha beta", "gamma", "BETA max", "beta"]);
        let index = SearchIndex::build(&store, &ids(), "beta");
        assert_eq!(index.len(), 3);
        let window = index.window(0);
        assert_eq!(
            window.entries.iter().map(|m| m.real_index).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
    }

    #[test]
    fn test_query_is_literal_not_regex() {
        let store = store_with(&["a.c", "abc"]);
        let index = SearchIndex::build(&store, &ids(), "a.c");
        assert_eq!(index.len(), 1);
        assert_eq!(index.window(0).entries[0].real_index, 0);
    }

    #[test]
    fn test_folded_hits_collapse_to_single_flagged_match() {
        let mut store = store_with(&[
            "##[group]setup",
            "needle one",
            "needle two",
            "##[endgroup]",
            "needle three",
        ]);
        store.fold("x", 0);
        let index = SearchIndex::build(&store, &ids(), "needle");
        assert_eq!(index.len(), 2);
        let window = index.window(0);
        assert!(window.entries[0].in_fold);
        assert_eq!(window.entries[0].fold_start, Some(0));
        assert!(!window.entries[1].in_fold);
        assert_eq!(window.entries[1].real_index, 4);
    }

    #[test]
    fn test_single_match_stays_put_on_retreat() {
        let store = store_with(&["a", "b", "c"]);
        let index = SearchIndex::build(&store, &ids(), "b");
        assert_eq!(index.len(), 1);
        assert_eq!(index.window(0).entries[0].real_index, 1);

        // Retreating with a single match stays put.
        let mut cursor = MatchCursor::new(index.window(0));
        assert_eq!(cursor.advance(-1), NavOutcome::Moved(0));
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn test_navigation_wraps_both_directions() {
        let store = store_with(&["hit", "hit", "hit"]);
        let index = SearchIndex::build(&store, &ids(), "hit");
        let mut cursor = MatchCursor::new(index.window(0));

        assert_eq!(cursor.advance(1), NavOutcome::Moved(1));
        assert_eq!(cursor.advance(1), NavOutcome::Moved(2));
        assert_eq!(cursor.advance(1), NavOutcome::Moved(0));
        assert_eq!(cursor.advance(-1), NavOutcome::Moved(2));
    }

    fn big_index(n: usize) -> SearchIndex {
        let messages: Vec<String> = (0..n).map(|i| format!("hit {i}")).collect();
        let refs: Vec<&str> = messages.iter().map(String::as_str).collect();
        let store = store_with(&refs);
        SearchIndex::build(&store, &ids(), "hit")
    }

    #[test]
    fn test_window_is_bounded_and_centered() {
        let index = big_index(5000);
        let window = index.window(2500);
        assert_eq!(window.entries.len(), MATCH_WINDOW);
        assert_eq!(window.start, 2000);
        assert_eq!(window.entry(2500).unwrap().real_index, 2500);
        assert_eq!(window.entry(2000).unwrap().real_index, 2000);
        assert!(window.entry(1999).is_none());
    }

    #[test]
    fn test_window_wraps_circularly_at_ends() {
        let index = big_index(5000);
        let window = index.window(10);
        // 500 before the pivot wraps to the tail of the list.
        assert_eq!(window.start, 4510);
        assert_eq!(window.entries[0].real_index, 4510);
        assert_eq!(window.entry(10).unwrap().real_index, 10);
        assert_eq!(window.entry(4999).unwrap().real_index, 4999);
    }

    #[test]
    fn test_navigation_requests_window_near_boundary() {
        let index = big_index(5000);
        let mut cursor = MatchCursor::new(index.window(2500));

        // Walk toward the window's upper edge; within 20 of it the cursor
        // must ask for a re-centered window before completing.
        let mut outcome = NavOutcome::Moved(2500);
        for _ in 0..500 {
            outcome = cursor.advance(1);
            if matches!(outcome, NavOutcome::NeedWindow(_)) {
                break;
            }
        }
        let NavOutcome::NeedWindow(pivot) = outcome else {
            panic!("expected a window refresh near the boundary");
        };
        assert!(pivot >= 2960, "refresh fired too early: {pivot}");

        let completed = cursor.complete(index.window(pivot));
        assert_eq!(completed, pivot);
        assert_eq!(cursor.current_ref().unwrap().real_index as usize, pivot);
    }

    #[test]
    fn test_small_list_never_requests_refresh() {
        let store = store_with(&["hit"; 30].to_vec());
        let index = SearchIndex::build(&store, &ids(), "hit");
        let mut cursor = MatchCursor::new(index.window(0));
        for _ in 0..100 {
            assert!(matches!(cursor.advance(1), NavOutcome::Moved(_)));
        }
    }
}
