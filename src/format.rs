use std::sync::OnceLock;

use regex::Regex;
use unicode_width::UnicodeWidthChar;

/// Detected severity of a log line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Command,
    Info,
    Warning,
    Error,
    Debug,
}

/// Bracketed severity tags, checked in order. The first tag found in a line
/// sets the line's severity and is stripped from the display text.
const SEVERITY_TAGS: &[(&str, Severity)] = &[
    ("##[command]", Severity::Command),
    ("##[info]", Severity::Info),
    ("##[warning]", Severity::Warning),
    ("##[error]", Severity::Error),
    ("##[debug]", Severity::Debug),
    ("[command]", Severity::Command),
    ("[info]", Severity::Info),
    ("[warning]", Severity::Warning),
    ("[error]", Severity::Error),
    ("[debug]", Severity::Debug),
];

impl Severity {
    /// Detect a severity tag in a line. Returns the severity and the line
    /// with the tag stripped, or None if no tag is present.
    pub fn extract(line: &str) -> Option<(Self, String)> {
        let mut best: Option<(usize, &str, Severity)> = None;
        for (tag, sev) in SEVERITY_TAGS {
            if let Some(pos) = line.find(tag) {
                let better = match best {
                    Some((best_pos, _, _)) => pos < best_pos,
                    None => true,
                };
                if better {
                    best = Some((pos, tag, *sev));
                }
            }
        }
        best.map(|(pos, tag, sev)| {
            let mut stripped = String::with_capacity(line.len() - tag.len());
            stripped.push_str(&line[..pos]);
            stripped.push_str(&line[pos + tag.len()..]);
            (sev, stripped)
        })
    }
}

/// A hyperlink span found in a line, kept so wrapping never cuts a link in
/// half. Offsets are in characters relative to the line the span lives on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSpan {
    /// The full `<a ...>...</a>` source text
    pub content: String,
    /// The href target
    pub href: String,
    /// The anchor text
    pub text: String,
    /// Character offset of the span start within its line
    pub start_index: usize,
}

impl LinkSpan {
    /// Character offset just past the span end
    pub fn end_index(&self) -> usize {
        self.start_index + self.content.chars().count()
    }
}

fn link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<a\s+href=(?:"([^"]*)"|'([^']*)'|([^\s>]+))\s*>(.*?)</a>"#)
            .expect("link pattern is valid")
    })
}

/// Extract hyperlink spans from a line, with character offsets.
pub fn extract_links(line: &str) -> Vec<LinkSpan> {
    let mut spans = Vec::new();
    for caps in link_pattern().captures_iter(line) {
        let m = caps.get(0).expect("whole match");
        let href = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|g| g.as_str().to_string())
            .unwrap_or_default();
        let text = caps.get(4).map(|g| g.as_str().to_string()).unwrap_or_default();
        let start_index = line[..m.start()].chars().count();
        spans.push(LinkSpan {
            content: m.as_str().to_string(),
            href,
            text,
            start_index,
        });
    }
    spans
}

/// Glyph width measurement, in pixels.
///
/// This is the seam for a real text-measurement backend (a canvas, a font
/// rasterizer). The bundled [`ApproxMeasure`] is a deliberately approximate
/// fallback for targets without one: wide CJK ideographs and wide punctuation
/// count double, tabs count a fixed number of columns, and anything
/// unmeasurable counts as a single column.
pub trait TextMeasure: Send {
    /// Pixel width of one glyph
    fn glyph_px(&self, ch: char) -> u32;
}

/// Column-based width estimate backed by `unicode-width`.
#[derive(Clone, Copy, Debug)]
pub struct ApproxMeasure {
    /// Pixel width of a single column
    pub column_px: u32,
    /// Columns occupied by a tab stop
    pub tab_columns: u32,
}

impl Default for ApproxMeasure {
    fn default() -> Self {
        Self {
            column_px: 8,
            tab_columns: 4,
        }
    }
}

impl TextMeasure for ApproxMeasure {
    fn glyph_px(&self, ch: char) -> u32 {
        if ch == '\t' {
            return self.tab_columns * self.column_px;
        }
        // Unmeasurable glyphs (control chars, unassigned) fall back to one column.
        let columns = UnicodeWidthChar::width(ch).unwrap_or(1) as u32;
        columns.max(1) * self.column_px
    }
}

/// One finished, displayable line
#[derive(Clone, Debug, PartialEq)]
pub struct LineRecord {
    /// Original, immutable sequence position within the stream
    pub index: u64,
    /// Dense position within the active (unfolded) sequence; recomputed by
    /// the store whenever folding changes
    pub display_index: usize,
    /// Display text, severity/group markers stripped
    pub message: String,
    /// Detected severity, if a tag was present
    pub severity: Option<Severity>,
    /// Styled lines render heavier than plain ones
    pub bold: bool,
    /// Receive timestamp of the chunk this line came from
    pub timestamp: Option<String>,
    /// True when this line starts a new physical line beyond the first of
    /// its chunk (text containing embedded breaks)
    pub is_new_line: bool,
    /// Left-column line number; None for wrap continuations
    pub line_no: Option<u64>,
    /// True when this line opens a collapsible group
    pub fold_start: bool,
    /// Original index of the matching group-close line, once known
    pub fold_end: Option<u64>,
    /// True while the group's lines are held in `children`. Slices sent to
    /// the renderer elide `children`, so the flag travels separately.
    pub collapsed: bool,
    /// Lines absorbed while the group is collapsed
    pub children: Vec<LineRecord>,
    /// Hyperlink spans within this line, offsets rebased after wrapping
    pub links: Vec<LinkSpan>,
}

impl LineRecord {
    /// Whether this record currently holds a collapsed group
    pub fn is_folded(&self) -> bool {
        !self.children.is_empty()
    }

    /// Copy for transfer to the renderer. `children` are elided without being
    /// cloned first; a collapsed group can hold arbitrarily many lines.
    pub fn view_clone(&self) -> LineRecord {
        LineRecord {
            index: self.index,
            display_index: self.display_index,
            message: self.message.clone(),
            severity: self.severity,
            bold: self.bold,
            timestamp: self.timestamp.clone(),
            is_new_line: self.is_new_line,
            line_no: self.line_no,
            fold_start: self.fold_start,
            fold_end: self.fold_end,
            collapsed: self.collapsed,
            children: Vec::new(),
            links: self.links.clone(),
        }
    }
}

/// A raw chunk of log text as received from a source
#[derive(Clone, Debug)]
pub struct RawChunk {
    pub message: String,
    pub timestamp: Option<String>,
}

/// Records are flushed to the store in batches of at most this many, so a
/// huge chunk never turns into one multi-second message.
pub const FLUSH_BATCH: usize = 20_000;

/// Converts raw chunks into normalized [`LineRecord`]s: severity extraction,
/// link extraction, width-aware wrapping, sequential indexing.
///
/// One formatter instance exists per stream; it owns the stream's index and
/// line-number counters.
pub struct LineFormatter {
    measure: Box<dyn TextMeasure>,
    next_index: u64,
    next_line_no: u64,
}

impl LineFormatter {
    pub fn new(measure: Box<dyn TextMeasure>) -> Self {
        Self {
            measure,
            next_index: 0,
            next_line_no: 0,
        }
    }

    /// Reset counters, e.g. after the owning stream is cleared.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.next_line_no = 0;
    }

    /// Format a batch of chunks against a target pixel width.
    ///
    /// Returns finished records grouped into flush batches of at most
    /// [`FLUSH_BATCH`] lines. Empty chunks are skipped.
    pub fn format_chunks(&mut self, chunks: &[RawChunk], target_width: u32) -> Vec<Vec<LineRecord>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();

        for chunk in chunks {
            if chunk.message.is_empty() {
                tracing::debug!("skipping empty chunk");
                continue;
            }
            for (physical_idx, physical) in split_physical_lines(&chunk.message).enumerate() {
                let is_new_line = physical_idx > 0;
                self.format_physical_line(
                    physical,
                    chunk.timestamp.as_deref(),
                    is_new_line,
                    target_width,
                    &mut current,
                );
                if current.len() >= FLUSH_BATCH {
                    batches.push(std::mem::take(&mut current));
                }
            }
        }

        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    fn format_physical_line(
        &mut self,
        raw: &str,
        timestamp: Option<&str>,
        is_new_line: bool,
        target_width: u32,
        out: &mut Vec<LineRecord>,
    ) {
        let (severity, text) = match Severity::extract(raw) {
            Some((sev, stripped)) => (Some(sev), stripped),
            None => (None, raw.to_string()),
        };
        let bold = severity.is_some();
        let links = extract_links(&text);
        let line_no = self.next_line_no;
        self.next_line_no += 1;

        for (segment_idx, (segment, segment_links)) in
            wrap_line(&text, &links, target_width, self.measure.as_ref())
                .into_iter()
                .enumerate()
        {
            out.push(LineRecord {
                index: self.next_index,
                display_index: 0,
                message: segment,
                severity,
                bold,
                timestamp: timestamp.map(|t| t.to_string()),
                is_new_line: is_new_line && segment_idx == 0,
                line_no: (segment_idx == 0).then_some(line_no),
                fold_start: false,
                fold_end: None,
                collapsed: false,
                children: Vec::new(),
                links: segment_links,
            });
            self.next_index += 1;
        }
    }
}

/// Split a chunk on line breaks; `\r\n` and bare `\n` both end a line.
fn split_physical_lines(message: &str) -> impl Iterator<Item = &str> {
    message.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Greedy width-budgeted wrap, pushed to link-span boundaries.
///
/// Returns `(segment_text, segment_links)` pairs; link offsets are rebased to
/// the segment they land in. A span wider than the whole budget is kept
/// intact and the segment is allowed to overflow.
fn wrap_line(
    text: &str,
    links: &[LinkSpan],
    target_width: u32,
    measure: &dyn TextMeasure,
) -> Vec<(String, Vec<LinkSpan>)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![(String::new(), Vec::new())];
    }
    // A zero budget would loop forever; treat it as one column per line.
    let budget = target_width.max(1);

    let mut segments = Vec::new();
    let mut seg_start = 0usize;
    let mut cursor = 0usize;
    let mut used = 0u32;

    while cursor < chars.len() {
        let w = measure.glyph_px(chars[cursor]);
        if used + w > budget && cursor > seg_start {
            let brk = adjust_break(seg_start, cursor, links);
            segments.push(make_segment(&chars, seg_start, brk, links));
            seg_start = brk;
            cursor = brk;
            used = 0;
        } else {
            used += w;
            cursor += 1;
        }
    }
    if seg_start < chars.len() || segments.is_empty() {
        segments.push(make_segment(&chars, seg_start, chars.len(), links));
    }
    segments
}

/// If a wrap point lands inside a link span, move it to fully exclude the
/// span, or fully include it when the span opens the segment.
fn adjust_break(seg_start: usize, brk: usize, links: &[LinkSpan]) -> usize {
    for span in links {
        let start = span.start_index;
        let end = span.end_index();
        if start < brk && brk < end {
            return if start > seg_start { start } else { end };
        }
    }
    brk
}

fn make_segment(
    chars: &[char],
    start: usize,
    end: usize,
    links: &[LinkSpan],
) -> (String, Vec<LinkSpan>) {
    let end = end.min(chars.len());
    let text: String = chars[start..end].iter().collect();
    let rebased = links
        .iter()
        .filter(|s| s.start_index >= start && s.end_index() <= end)
        .map(|s| LinkSpan {
            start_index: s.start_index - start,
            ..s.clone()
        })
        .collect();
    (text, rebased)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> LineFormatter {
        LineFormatter::new(Box::new(ApproxMeasure::default()))
    }

    fn chunk(msg: &str) -> RawChunk {
        RawChunk {
            message: msg.to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn test_severity_extract_strips_tag() {
        let (sev, text) = Severity::extract("##[error]build failed").unwrap();
        assert_eq!(sev, Severity::Error);
        assert_eq!(text, "build failed");
    }

    #[test]
    fn test_severity_extract_first_tag_wins() {
        let (sev, text) = Severity::extract("x ##[warning]w ##[error]e").unwrap();
        assert_eq!(sev, Severity::Warning);
        assert_eq!(text, "x w ##[error]e");
    }

    #[test]
    fn test_severity_none_for_plain_line() {
        assert!(Severity::extract("nothing to see").is_none());
    }

    #[test]
    fn test_extract_links() {
        let line = r#"see <a href="https://example.com">docs</a> for more"#;
        let links = extract_links(line);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href, "https://example.com");
        assert_eq!(links[0].text, "docs");
        assert_eq!(links[0].start_index, 4);
    }

    #[test]
    fn test_format_assigns_sequential_indexes() {
        let mut f = formatter();
        let batches = f.format_chunks(&[chunk("a"), chunk("b"), chunk("c")], 800);
        let lines: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines.iter().map(|l| l.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_embedded_breaks_mark_new_lines() {
        let mut f = formatter();
        let lines: Vec<_> = f
            .format_chunks(&[chunk("first\nsecond\r\nthird")], 800)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(!lines[0].is_new_line);
        assert!(lines[1].is_new_line);
        assert!(lines[2].is_new_line);
        assert_eq!(lines[2].message, "third");
        // Each physical line gets its own left-column number.
        assert_eq!(
            lines.iter().map(|l| l.line_no).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn test_wrap_splits_on_width_budget() {
        let mut f = formatter();
        // 8 px per column, budget 32 px -> 4 chars per line
        let lines: Vec<_> = f
            .format_chunks(&[chunk("abcdefghij")], 32)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(
            lines.iter().map(|l| l.message.as_str()).collect::<Vec<_>>(),
            vec!["abcd", "efgh", "ij"]
        );
        // Continuations carry no line number.
        assert_eq!(
            lines.iter().map(|l| l.line_no).collect::<Vec<_>>(),
            vec![Some(0), None, None]
        );
    }

    #[test]
    fn test_wide_glyphs_count_double() {
        let measure = ApproxMeasure::default();
        assert_eq!(measure.glyph_px('a'), 8);
        assert_eq!(measure.glyph_px('情'), 16);
        assert_eq!(measure.glyph_px('\t'), 32);
        // Control chars fall back to a single column, never zero.
        assert_eq!(measure.glyph_px('\u{1}'), 8);
    }

    #[test]
    fn test_wrap_never_splits_a_link() {
        let text = r#"ab<a href=u>linked</a>cd"#;
        let links = extract_links(text);
        let measure = ApproxMeasure::default();
        // 4-char budget: naive break at char 4 would land inside the span.
        let segments = wrap_line(text, &links, 32, &measure);
        let span_text = r#"<a href=u>linked</a>"#;
        for (seg, _) in &segments {
            let has_open = seg.contains("<a ");
            let has_close = seg.contains("</a>");
            assert_eq!(has_open, has_close, "split span in segment {seg:?}");
        }
        // The span survives whole in exactly one segment.
        assert_eq!(
            segments.iter().filter(|(s, _)| s.contains(span_text)).count(),
            1
        );
    }

    #[test]
    fn test_wrap_rebases_link_offsets() {
        let text = r#"abcd<a href=u>x</a>"#;
        let links = extract_links(text);
        let measure = ApproxMeasure::default();
        let segments = wrap_line(text, &links, 32, &measure);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].1.len(), 1);
        assert_eq!(segments[1].1[0].start_index, 0);
    }

    #[test]
    fn test_empty_chunk_is_skipped() {
        let mut f = formatter();
        assert!(f.format_chunks(&[chunk("")], 800).is_empty());
    }

    #[test]
    fn test_large_chunk_flushes_in_batches() {
        let mut f = formatter();
        let big = "x\n".repeat(FLUSH_BATCH + 5);
        let batches = f.format_chunks(&[chunk(big.trim_end())], 800);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), FLUSH_BATCH);
        assert_eq!(batches[1].len(), 5);
    }
}
