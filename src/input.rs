use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use tui_textarea::Input;

use crate::app::{InputMode, ViewerState};
use crate::ui::MINIMAP_WIDTH;

/// Lines moved per wheel tick
const WHEEL_LINES: f64 = 3.0;

/// Handle a mouse event. `term_width`/`term_height` are the full terminal
/// size; the body (log + minimap) occupies rows 1..height-2.
pub fn handle_mouse(state: &mut ViewerState, mouse: MouseEvent, term_width: u16, term_height: u16) {
    let item_height = state.config.item_height as f64;
    match mouse.kind {
        MouseEventKind::ScrollUp => {
            state.wheel(-WHEEL_LINES * item_height);
        }
        MouseEventKind::ScrollDown => {
            state.wheel(WHEEL_LINES * item_height);
        }
        MouseEventKind::Down(MouseButton::Left) => {
            if let Some(row) = body_row(mouse.row, term_height) {
                if mouse.column >= term_width.saturating_sub(MINIMAP_WIDTH) {
                    drag_minimap(state, row, term_height);
                } else {
                    // Click on a group line toggles its fold.
                    state.toggle_fold_at(state.slice_start + row as usize);
                }
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if state.dragging {
                if let Some(row) = body_row(mouse.row, term_height) {
                    drag_minimap(state, row, term_height);
                }
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            state.end_drag();
        }
        _ => {}
    }
}

/// Row within the log body, if the pointer is over it
fn body_row(row: u16, term_height: u16) -> Option<u16> {
    let body_height = term_height.saturating_sub(3);
    (row >= 1 && row < 1 + body_height).then(|| row - 1)
}

/// Translate a pointer row on the minimap strip into a thumb position
fn drag_minimap(state: &mut ViewerState, row: u16, term_height: u16) {
    let Some(geometry) = state.geometry() else {
        return;
    };
    let body_height = term_height.saturating_sub(3).max(1) as f64;
    let fraction = row as f64 / body_height;
    // Center the thumb under the pointer.
    let thumb_px = geometry.viewport().height / 8.0;
    let map_top = fraction * geometry.map_height() - thumb_px / 2.0;
    state.drag_to(map_top, Instant::now());
}

/// Handle a key event and update viewer state accordingly
pub fn handle_key(state: &mut ViewerState, key: KeyEvent) {
    // Help overlay takes priority
    if state.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            state.show_help = false;
        }
        return;
    }

    match state.mode {
        InputMode::Normal => handle_normal_mode(state, key),
        InputMode::SearchEditing => handle_search_mode(state, key),
    }
}

fn handle_normal_mode(state: &mut ViewerState, key: KeyEvent) {
    let item_height = state.config.item_height as f64;
    let page = state
        .geometry()
        .map(|g| g.viewport().height)
        .unwrap_or(10.0 * item_height);

    match key.code {
        // Quit
        KeyCode::Char('q') => {
            state.should_quit = true;
        }
        // Ctrl+C also quits
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.should_quit = true;
        }

        // Help
        KeyCode::Char('?') => {
            state.show_help = true;
        }

        // Vertical navigation
        KeyCode::Char('j') | KeyCode::Down => {
            state.wheel(WHEEL_LINES * item_height);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            state.wheel(-WHEEL_LINES * item_height);
        }
        KeyCode::PageDown => {
            state.wheel(page);
        }
        KeyCode::PageUp => {
            state.wheel(-page);
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.wheel(page);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.wheel(-page);
        }
        KeyCode::Char('g') => {
            state.go_to_top();
        }
        KeyCode::Char('G') => {
            state.go_to_bottom();
        }

        // Horizontal scroll for long lines
        KeyCode::Char('l') | KeyCode::Right => {
            state.scroll_horizontal(4);
        }
        KeyCode::Char('h') | KeyCode::Left => {
            state.scroll_horizontal(-4);
        }

        // Enter search mode
        KeyCode::Char('/') => {
            state.mode = InputMode::SearchEditing;
            state.search_textarea.select_all();
            state.search_textarea.cut();
        }

        // Match navigation
        KeyCode::Char('n') => {
            state.navigate_match(1);
        }
        KeyCode::Char('N') => {
            state.navigate_match(-1);
        }

        // Fold the nearest group in view
        KeyCode::Char('z') | KeyCode::Enter => {
            state.toggle_nearest_fold();
        }

        // Follow mode
        KeyCode::Char('f') => {
            state.toggle_follow();
        }

        // Saved searches
        KeyCode::Char('s') => {
            state.save_current_search();
        }
        KeyCode::Char('.') => {
            state.apply_next_saved_search();
        }

        // Copy
        KeyCode::Char('y') => {
            state.copy_visible_line();
        }

        // Clear search
        KeyCode::Esc => {
            if state.active_query.is_some() {
                state.clear_search();
                state.search_textarea.select_all();
                state.search_textarea.cut();
                state.status_message = Some("search cleared".to_string());
            }
        }

        _ => {}
    }
}

fn handle_search_mode(state: &mut ViewerState, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            state.submit_search();
        }
        KeyCode::Esc => {
            // Restore the input to the previous query.
            let prev = state.active_query.clone().unwrap_or_default();
            state.search_textarea = tui_textarea::TextArea::new(vec![prev]);
            state
                .search_textarea
                .set_cursor_line_style(ratatui::style::Style::default());
            state.mode = InputMode::Normal;
        }
        _ => {
            // Forward all other keys to the textarea
            let input = Input::from(key);
            state.search_textarea.input(input);
        }
    }
}
