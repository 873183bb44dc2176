use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use regex::{Regex, RegexBuilder};

use crate::app::{InputMode, ViewerState};
use crate::format::{LineRecord, Severity};
use crate::minimap::SampleRow;

/// Width of the minimap strip, shared with the mouse handler
pub const MINIMAP_WIDTH: u16 = 10;

/// Draw the entire UI
pub fn draw(frame: &mut Frame, state: &mut ViewerState) {
    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(3),    // Log view + minimap
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Search bar
        ])
        .split(frame.area());

    draw_header(frame, state, content_chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(MINIMAP_WIDTH)])
        .split(content_chunks[1]);

    draw_log_view(frame, state, body[0]);
    draw_minimap(frame, state, body[1]);
    draw_status_bar(frame, state, content_chunks[2]);
    draw_search_bar(frame, state, content_chunks[3]);

    if state.show_help {
        draw_help_overlay(frame, state);
    }
}

/// Draw the header showing the stream
fn draw_header(frame: &mut Frame, state: &ViewerState, area: Rect) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " longview ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("| "),
        Span::styled(state.stream_id.clone(), Style::default().fg(Color::Cyan)),
    ]))
    .style(Style::default().bg(Color::DarkGray));

    frame.render_widget(header, area);
}

/// Draw the main log view
fn draw_log_view(frame: &mut Frame, state: &mut ViewerState, area: Rect) {
    let height = area.height as usize;
    if height == 0 {
        return;
    }

    if !state.has_complete_init {
        let msg = Paragraph::new("loading...")
            .style(Style::default().fg(state.theme.empty_state));
        frame.render_widget(msg, area);
        return;
    }
    if state.total_count == 0 {
        let msg = Paragraph::new("Waiting for log lines...")
            .style(Style::default().fg(state.theme.empty_state));
        frame.render_widget(msg, area);
        return;
    }

    let query_pattern = state.active_query.as_deref().and_then(|q| {
        RegexBuilder::new(&regex::escape(q))
            .case_insensitive(true)
            .build()
            .ok()
    });

    let mut rows: Vec<Line<'_>> = Vec::with_capacity(height);
    for row in 0..height {
        match state.slice.get(row) {
            Some(record) => rows.push(log_line(state, record, query_pattern.as_ref())),
            None => rows.push(Line::default()),
        }
    }

    frame.render_widget(Paragraph::new(rows), area);
}

/// Build one rendered log row: gutter, fold marker, styled message
fn log_line<'s>(
    state: &'s ViewerState,
    record: &'s LineRecord,
    query: Option<&Regex>,
) -> Line<'s> {
    let theme = &state.theme;
    let mut spans: Vec<Span<'s>> = Vec::new();

    let number = match record.line_no {
        Some(n) => format!("{:>6} ", n + 1),
        None => " ".repeat(7),
    };
    spans.push(Span::styled(number, Style::default().fg(theme.line_number)));

    let marker = if record.fold_start {
        if record.collapsed { "▸ " } else { "▾ " }
    } else {
        "  "
    };
    spans.push(Span::styled(marker, Style::default().fg(theme.fold_marker)));

    spans.extend(message_spans(record, query, state.h_offset, state));
    Line::from(spans)
}

/// Per-character styling: severity base, link spans, match highlight, then a
/// horizontal-offset cut and a coalescing pass into spans.
fn message_spans(
    record: &LineRecord,
    query: Option<&Regex>,
    h_offset: usize,
    state: &ViewerState,
) -> Vec<Span<'static>> {
    let theme = &state.theme;
    let chars: Vec<char> = record.message.chars().collect();
    if chars.is_empty() || h_offset >= chars.len() {
        return Vec::new();
    }

    let mut base = Style::default();
    if let Some(severity) = record.severity {
        base = base.fg(theme.severity_color(severity));
    }
    if record.bold {
        base = base.add_modifier(Modifier::BOLD);
    }
    let mut styles = vec![base; chars.len()];

    for link in &record.links {
        let end = link.end_index().min(chars.len());
        for style in &mut styles[link.start_index.min(chars.len())..end] {
            *style = Style::default()
                .fg(theme.link)
                .add_modifier(Modifier::UNDERLINED);
        }
    }

    if let Some(pattern) = query {
        // Regex offsets are bytes; map them onto the char array.
        let byte_starts: Vec<usize> = record.message.char_indices().map(|(b, _)| b).collect();
        let to_char = |byte: usize| match byte_starts.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        };
        let highlight = Style::default()
            .fg(theme.highlight_match_fg)
            .bg(theme.highlight_match_bg);
        for m in pattern.find_iter(&record.message) {
            let start = to_char(m.start());
            let end = to_char(m.end()).min(chars.len());
            for style in &mut styles[start..end] {
                *style = highlight;
            }
        }
    }

    // Coalesce equal-styled runs, starting after the horizontal offset.
    let mut spans = Vec::new();
    let mut run = String::new();
    let mut run_style = styles[h_offset];
    for (ch, style) in chars[h_offset..].iter().zip(&styles[h_offset..]) {
        if *style != run_style && !run.is_empty() {
            spans.push(Span::styled(std::mem::take(&mut run), run_style));
        }
        run_style = *style;
        run.push(*ch);
    }
    if !run.is_empty() {
        spans.push(Span::styled(run, run_style));
    }
    spans
}

/// Draw the minimap strip: sampled rows compressed onto terminal rows, with
/// the thumb shown reversed
fn draw_minimap(frame: &mut Frame, state: &ViewerState, area: Rect) {
    let height = area.height as usize;
    if height == 0 || state.sample.is_empty() {
        return;
    }
    let Some(geometry) = state.geometry() else {
        return;
    };

    // Thumb extent in terminal rows.
    let map_height = geometry.map_height().max(1.0);
    let map_top = geometry.map_top(state.scroll_offset);
    let thumb_px = geometry.viewport().height / 8.0;
    let thumb_top = ((map_top / map_height) * height as f64).floor() as usize;
    let thumb_len = (((thumb_px / map_height) * height as f64).ceil() as usize).max(1);

    let block = Block::default()
        .borders(Borders::LEFT)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let per_row = (state.sample.len() as f64 / height as f64).max(1.0);
    let mut rows: Vec<Line<'_>> = Vec::with_capacity(height);
    for row in 0..height {
        let start = (row as f64 * per_row) as usize;
        let end = (((row + 1) as f64 * per_row) as usize).min(state.sample.len());
        let bucket = state.sample.get(start..end.max(start)).unwrap_or(&[]);

        let (glyph, style) = minimap_cell(state, bucket);
        let mut style = style;
        if row >= thumb_top && row < thumb_top + thumb_len {
            style = style.add_modifier(Modifier::REVERSED);
        }
        rows.push(Line::from(Span::styled(
            glyph.repeat(inner.width as usize),
            style,
        )));
    }

    frame.render_widget(Paragraph::new(rows), inner);
}

/// Pick the most severe style present in a bucket of sampled rows
fn minimap_cell(state: &ViewerState, bucket: &[SampleRow]) -> (&'static str, Style) {
    let rank = |s: Option<Severity>| match s {
        Some(Severity::Error) => 5,
        Some(Severity::Warning) => 4,
        Some(Severity::Command) => 3,
        Some(Severity::Debug) => 2,
        Some(Severity::Info) => 1,
        None => 0,
    };
    let top = bucket
        .iter()
        .filter(|r| r.width > 0)
        .max_by_key(|r| rank(r.severity));

    match top {
        None => (" ", Style::default()),
        Some(row) => {
            let color = match row.severity {
                Some(severity) => state.theme.severity_color(severity),
                None => Color::DarkGray,
            };
            let mut style = Style::default().fg(color);
            if row.bold {
                style = style.add_modifier(Modifier::BOLD);
            }
            ("▪", style)
        }
    }
}

/// Draw the status bar
fn draw_status_bar(frame: &mut Frame, state: &ViewerState, area: Rect) {
    let theme = &state.theme;
    let mode_str = match state.mode {
        InputMode::Normal => "NORMAL",
        InputMode::SearchEditing => "SEARCH",
    };

    let follow_indicator = if state.follow { "[F]" } else { "" };
    let offset_indicator = if state.h_offset > 0 {
        format!("[>{}]", state.h_offset)
    } else {
        String::new()
    };
    let match_str = match state.match_counts() {
        Some((current, total)) => format!(" | match {}/{}", current, total),
        None => String::new(),
    };
    let err_str = state
        .err_message
        .as_ref()
        .map(|e| format!(" | {}", e))
        .unwrap_or_default();

    let help_text = match state.mode {
        InputMode::SearchEditing => " Enter:search  Esc:cancel ",
        _ => " ?:help  /:search  n/N:match  z:fold ",
    };

    let status = Line::from(vec![
        Span::styled(
            format!(" {} ", mode_str),
            Style::default()
                .bg(theme.status_mode_bg)
                .fg(theme.status_mode_fg),
        ),
        Span::raw(format!(
            " {} lines {}{}{}{} ",
            state.total_count, follow_indicator, offset_indicator, match_str, err_str
        )),
        Span::styled(help_text, Style::default().fg(theme.status_help)),
    ]);

    let paragraph = Paragraph::new(status).style(Style::default().bg(theme.status_bg));
    frame.render_widget(paragraph, area);
}

/// Draw the search input bar
fn draw_search_bar(frame: &mut Frame, state: &mut ViewerState, area: Rect) {
    match state.mode {
        InputMode::SearchEditing => {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(1), Constraint::Min(1)])
                .split(area);

            let prefix =
                Paragraph::new("/").style(Style::default().fg(state.theme.search_prefix));
            frame.render_widget(prefix, chunks[0]);
            frame.render_widget(&state.search_textarea, chunks[1]);
        }
        _ => {
            if let Some(msg) = &state.status_message {
                let content = Line::from(Span::styled(
                    msg.as_str(),
                    Style::default().fg(state.theme.warning_message),
                ));
                frame.render_widget(Paragraph::new(content), area);
            }
        }
    }
}

/// Draw the help overlay
fn draw_help_overlay(frame: &mut Frame, state: &ViewerState) {
    let area = frame.area();

    let width = 52.min(area.width.saturating_sub(4));
    let height = 20.min(area.height.saturating_sub(4));
    let x = (area.width - width) / 2;
    let y = (area.height - height) / 2;
    let help_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, help_area);

    let help_text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  j/k, ↑/↓     Scroll up/down"),
        Line::from("  g/G          Go to top/bottom"),
        Line::from("  PgUp/PgDn    Page up/down"),
        Line::from("  h/l, ←/→     Scroll long lines"),
        Line::from("  Mouse wheel  Scroll; drag minimap to jump"),
        Line::from(""),
        Line::from("Search:"),
        Line::from("  /            Start search input"),
        Line::from("  n/N          Next/previous match"),
        Line::from("  s            Save current search"),
        Line::from("  .            Apply next saved search"),
        Line::from("  Esc          Clear search"),
        Line::from(""),
        Line::from("Display:"),
        Line::from("  z / click    Toggle group fold"),
        Line::from("  f            Toggle follow mode"),
        Line::from("  y            Copy first visible line"),
        Line::from("  q            Quit"),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state.theme.help_border))
        .style(Style::default().bg(state.theme.help_bg));

    frame.render_widget(Paragraph::new(help_text).block(block), help_area);
}
