use std::time::Instant;

use ratatui::style::{Color, Style};
use tui_textarea::TextArea;

use crate::config::{Config, SavedSearch, load_saved_searches, save_saved_searches};
use crate::format::LineRecord;
use crate::minimap::SampleRow;
use crate::scroll::{DragThrottle, Geometry, Viewport};
use crate::search::{MatchCursor, NavOutcome};
use crate::theme::Theme;
use crate::worker::{EngineEvent, EngineHandle, SliceResponse};

/// Input mode for the application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Normal navigation mode
    Normal,
    /// Editing the search query
    SearchEditing,
}

/// Viewer-side state: read-only cached slice plus viewport-derived geometry.
///
/// All log data lives in the engine workers; this struct holds only what the
/// current render pass needs, and nothing here is mutated outside event
/// handling between passes. Worker responses carry a generation id, and
/// anything older than the handle's current generation is discarded.
pub struct ViewerState<'a> {
    /// Stream shown by this viewer
    pub stream_id: String,
    pub config: Config,
    pub theme: Theme,
    engine: EngineHandle,

    /// Viewport in pixels; None until a non-zero size is observed
    pub viewport: Option<Viewport>,
    /// Last-write-wins active line count
    pub total_count: usize,
    /// Current scroll offset, in track pixels
    pub scroll_offset: f64,
    /// Horizontal scroll, in columns
    pub h_offset: usize,
    /// Stick to the newest lines as they arrive
    pub follow: bool,

    /// Cached viewport slice
    pub slice: Vec<LineRecord>,
    /// Active position of `slice[0]`
    pub slice_start: usize,
    /// Cached minimap sampling window
    pub sample: Vec<SampleRow>,
    /// Active position of `sample[0]`
    pub sample_start: usize,

    /// Current input mode
    pub mode: InputMode,
    /// Search query input widget
    pub search_textarea: TextArea<'a>,
    /// Query highlighted in the log view, if a search ran
    pub active_query: Option<String>,
    /// Cursor over the current match list
    pub matches: Option<MatchCursor>,
    /// Saved searches, persisted as JSON
    pub saved_searches: Vec<SavedSearch>,
    next_saved_idx: usize,

    /// Whether a minimap drag is in progress
    pub dragging: bool,
    drag_throttle: DragThrottle,
    /// Jump target deferred until an unfold completes
    pending_match_jump: bool,

    /// Whether the app should quit
    pub should_quit: bool,
    /// Status message to display
    pub status_message: Option<String>,
    /// Whether to show help overlay
    pub show_help: bool,
    /// A first slice arrived; before that the view shows "loading"
    pub has_complete_init: bool,
    /// Last source error, surfaced in the status bar
    pub err_message: Option<String>,
}

impl<'a> ViewerState<'a> {
    pub fn new(config: Config, stream_id: String, engine: EngineHandle) -> Self {
        let mut textarea = TextArea::default();
        textarea.set_cursor_line_style(Style::default());
        textarea.set_placeholder_text("type to search...");
        textarea.set_placeholder_style(Style::default().fg(Color::DarkGray));

        let theme = Theme::by_name(&config.theme);
        let follow = config.follow;

        Self {
            stream_id,
            config,
            theme,
            engine,
            viewport: None,
            total_count: 0,
            scroll_offset: 0.0,
            h_offset: 0,
            follow,
            slice: Vec::new(),
            slice_start: 0,
            sample: Vec::new(),
            sample_start: 0,
            mode: InputMode::Normal,
            search_textarea: textarea,
            active_query: None,
            matches: None,
            saved_searches: load_saved_searches(),
            next_saved_idx: 0,
            dragging: false,
            drag_throttle: DragThrottle::default(),
            pending_match_jump: false,
            should_quit: false,
            status_message: None,
            show_help: false,
            has_complete_init: false,
            err_message: None,
        }
    }

    /// Current geometry; None while the viewport has zero size
    pub fn geometry(&self) -> Option<Geometry> {
        let viewport = self.viewport?;
        Geometry::new(viewport, self.config.item_height as f64, self.total_count)
    }

    /// Wrap width handed to the formatter when appending
    pub fn wrap_width(&self) -> u32 {
        if self.config.wrap_columns > 0 {
            return self.config.wrap_columns * self.config.column_px;
        }
        match self.viewport {
            // Leave room for the number gutter and minimap strip.
            Some(v) => (v.width as u32).saturating_sub(20 * self.config.column_px).max(
                self.config.column_px * 20,
            ),
            None => 800,
        }
    }

    /// Apply a viewport size change, preserving the relative scroll position
    pub fn resize(&mut self, width: f64, height: f64) {
        if width <= 0.0 || height <= 0.0 {
            // Not ready; defer all geometry math.
            self.viewport = None;
            return;
        }
        let old = self.geometry();
        self.viewport = Some(Viewport { width, height });
        if let (Some(old), Some(new)) = (old, self.geometry()) {
            self.scroll_offset = new.rescale_offset(&old, self.scroll_offset);
        }
        self.request_slice();
    }

    /// Request the slice and minimap sample for the current offset
    pub fn request_slice(&self) {
        let Some(geometry) = self.geometry() else {
            return;
        };
        let start = geometry.first_visible(self.scroll_offset);
        let (sample_start, sample_count) = geometry.minimap_window(self.scroll_offset);
        self.engine.request_slice(
            self.stream_id.clone(),
            start,
            geometry.item_number(),
            sample_start,
            sample_count,
        );
    }

    /// Apply an engine event. Stale generations are silently discarded.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        let current_gen = self.engine.generation();
        match event {
            EngineEvent::Appended {
                stream_id,
                total_count,
                generation,
            } => {
                if stream_id != self.stream_id || generation < current_gen {
                    return;
                }
                self.total_count = total_count;
                if self.follow {
                    if let Some(g) = self.geometry() {
                        self.scroll_offset = g.max_scroll();
                    }
                }
                self.request_slice();
            }
            EngineEvent::Slice(slice) => {
                if slice.stream_id != self.stream_id || slice.generation < current_gen {
                    return;
                }
                self.apply_slice(slice);
            }
            EngineEvent::FoldDone(fold) => {
                if fold.stream_id != self.stream_id || fold.generation < current_gen {
                    return;
                }
                self.total_count = fold.total_count;
                self.clamp_offset();
                self.request_slice();
                if self.pending_match_jump {
                    // The unfold changed display positions; fetch a fresh
                    // window before completing the jump.
                    self.pending_match_jump = false;
                    if let Some(cursor) = &self.matches {
                        self.engine.request_match_window(cursor.current());
                    }
                }
            }
            EngineEvent::SearchDone(result) => {
                if result.generation < current_gen {
                    return;
                }
                self.status_message = Some(match result.total_matches {
                    0 => "no matches".to_string(),
                    n => format!("{} matches", n),
                });
                let cursor = MatchCursor::new(result.window);
                self.matches = Some(cursor);
                self.jump_to_current_match();
            }
            EngineEvent::MatchWindowReady(window) => {
                if let Some(cursor) = &mut self.matches {
                    cursor.complete(window);
                }
                self.jump_to_current_match();
            }
        }
    }

    fn apply_slice(&mut self, slice: SliceResponse) {
        // Last-write-wins on the total; a stale slice racing a fold is
        // tolerated and simply re-requested against the new state.
        let changed = slice.total_count != self.total_count;
        self.total_count = slice.total_count;
        self.slice = slice.lines;
        self.slice_start = slice.start;
        self.sample = slice.sample;
        self.sample_start = slice.sample_start;
        self.has_complete_init = true;
        if changed {
            self.clamp_offset();
            self.request_slice();
        }
    }

    fn clamp_offset(&mut self) {
        if let Some(g) = self.geometry() {
            self.scroll_offset = self.scroll_offset.clamp(0.0, g.max_scroll());
        }
    }

    /// Scroll by a wheel delta in pixels; the conversion goes through
    /// minimap space so large logs move proportionally.
    pub fn wheel(&mut self, delta_px: f64) {
        let Some(g) = self.geometry() else {
            return;
        };
        self.scroll_offset = g.apply_wheel(self.scroll_offset, delta_px);
        self.follow = self.scroll_offset >= g.max_scroll() - f64::EPSILON;
        self.request_slice();
    }

    /// Scroll so `line` is at the top of the viewport
    pub fn scroll_to_line(&mut self, line: usize) {
        let Some(g) = self.geometry() else {
            return;
        };
        self.scroll_offset = g.offset_for_line(line);
        self.follow = false;
        self.request_slice();
    }

    /// Go to the top of the log
    pub fn go_to_top(&mut self) {
        self.scroll_offset = 0.0;
        self.follow = false;
        self.request_slice();
    }

    /// Go to the bottom of the log and re-enable follow
    pub fn go_to_bottom(&mut self) {
        if let Some(g) = self.geometry() {
            self.scroll_offset = g.max_scroll();
        }
        self.follow = true;
        self.request_slice();
    }

    /// Begin or continue a minimap drag at an absolute thumb position.
    /// Queries are throttled; the trailing position fires on release.
    pub fn drag_to(&mut self, map_top: f64, now: Instant) {
        let Some(g) = self.geometry() else {
            return;
        };
        self.dragging = true;
        self.follow = false;
        self.scroll_offset = g.offset_for_map_top(map_top);
        if self.drag_throttle.offer(now, self.scroll_offset).is_some() {
            self.request_slice();
        }
    }

    /// Finish a drag, firing the trailing request if one was suppressed
    pub fn end_drag(&mut self) {
        if !self.dragging {
            return;
        }
        self.dragging = false;
        if self.drag_throttle.finish().is_some() {
            self.request_slice();
        }
    }

    /// Submit the search input as the active query
    pub fn submit_search(&mut self) {
        let query = self.search_input();
        self.mode = InputMode::Normal;
        if query.is_empty() {
            self.clear_search();
            return;
        }
        self.active_query = Some(query.clone());
        self.engine
            .request_search(vec![self.stream_id.clone()], query);
    }

    /// Drop the active query and match state
    pub fn clear_search(&mut self) {
        self.active_query = None;
        self.matches = None;
        self.status_message = None;
    }

    pub fn search_input(&self) -> String {
        self.search_textarea.lines().join("")
    }

    /// Step through matches; +1 next, -1 previous, wrapping at both ends
    pub fn navigate_match(&mut self, direction: i64) {
        let Some(cursor) = &mut self.matches else {
            return;
        };
        if cursor.total() == 0 {
            return;
        }
        match cursor.advance(direction) {
            NavOutcome::Moved(_) => self.jump_to_current_match(),
            NavOutcome::NeedWindow(pivot) => {
                // Complete the navigation once the re-centered window arrives.
                self.engine.request_match_window(pivot);
            }
        }
    }

    /// Scroll to the current match, unfolding its group first if needed
    fn jump_to_current_match(&mut self) {
        let Some(cursor) = &self.matches else {
            return;
        };
        let Some(m) = cursor.current_ref() else {
            return;
        };
        if m.in_fold {
            if let Some(start) = m.fold_start {
                self.pending_match_jump = true;
                self.engine.request_fold(self.stream_id.clone(), start);
                return;
            }
        }
        let line = m.display_index;
        self.scroll_to_line(line);
    }

    /// Toggle the fold at an active position, if that line opens a group
    pub fn toggle_fold_at(&mut self, position: usize) {
        let Some(line) = self
            .slice
            .get(position.wrapping_sub(self.slice_start))
        else {
            return;
        };
        if line.fold_start {
            self.engine.request_fold(self.stream_id.clone(), line.index);
        }
    }

    /// Toggle the nearest group at or above the first visible line
    pub fn toggle_nearest_fold(&mut self) {
        if let Some(line) = self.slice.iter().find(|l| l.fold_start) {
            self.engine.request_fold(self.stream_id.clone(), line.index);
        } else {
            self.status_message = Some("no group in view".to_string());
        }
    }

    /// Save the active query for later sessions
    pub fn save_current_search(&mut self) {
        let Some(query) = self.active_query.clone() else {
            self.status_message = Some("no active search to save".to_string());
            return;
        };
        let name = if query.len() > 10 {
            format!("{}...", &query[..10])
        } else {
            query.clone()
        };
        self.saved_searches.push(SavedSearch { name, query });
        match save_saved_searches(&self.saved_searches) {
            Ok(()) => self.status_message = Some("search saved".to_string()),
            Err(e) => self.status_message = Some(format!("save failed: {}", e)),
        }
    }

    /// Apply the next saved search, cycling through the list
    pub fn apply_next_saved_search(&mut self) {
        if self.saved_searches.is_empty() {
            self.status_message = Some("no saved searches".to_string());
            return;
        }
        let saved = &self.saved_searches[self.next_saved_idx % self.saved_searches.len()];
        self.next_saved_idx += 1;
        let query = saved.query.clone();
        self.status_message = Some(format!("searching: {}", saved.name));
        self.search_textarea = TextArea::new(vec![query.clone()]);
        self.search_textarea.set_cursor_line_style(Style::default());
        self.active_query = Some(query.clone());
        self.engine
            .request_search(vec![self.stream_id.clone()], query);
    }

    /// Copy the first visible line to the clipboard
    pub fn copy_visible_line(&mut self) {
        let Some(line) = self.slice.first() else {
            self.status_message = Some("nothing to copy".to_string());
            return;
        };
        let text = line.message.clone();
        match arboard::Clipboard::new().and_then(|mut c| c.set_text(text)) {
            Ok(()) => self.status_message = Some("line copied".to_string()),
            Err(e) => self.status_message = Some(format!("copy failed: {}", e)),
        }
    }

    /// Horizontal scroll for long lines, in columns
    pub fn scroll_horizontal(&mut self, delta: i64) {
        self.h_offset = (self.h_offset as i64 + delta).max(0) as usize;
    }

    /// Toggle follow mode
    pub fn toggle_follow(&mut self) {
        if self.follow {
            self.follow = false;
            self.status_message = Some("follow off".to_string());
        } else {
            self.go_to_bottom();
            self.status_message = Some("follow on".to_string());
        }
    }

    /// Queue raw chunks from the source for formatting
    pub fn append_chunks(&self, chunks: Vec<crate::format::RawChunk>) {
        let engine = self.engine.clone();
        let stream_id = self.stream_id.clone();
        let width = self.wrap_width();
        tokio::spawn(async move {
            let _ = engine.append(stream_id, chunks, width).await;
        });
    }

    /// Match indicator for the status bar: `(current, total)`
    pub fn match_counts(&self) -> Option<(usize, usize)> {
        self.matches
            .as_ref()
            .filter(|c| c.total() > 0)
            .map(|c| (c.current() + 1, c.total()))
    }
}
