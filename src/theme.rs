use ratatui::style::Color;

use crate::format::Severity;
use crate::minimap::Rgba;

/// All themeable colors in the application
#[derive(Clone, Debug)]
pub struct Theme {
    // Severities
    pub severity_command: Color,
    pub severity_info: Color,
    pub severity_warning: Color,
    pub severity_error: Color,
    pub severity_debug: Color,

    // Log view
    pub line_number: Color,
    pub timestamp: Color,
    pub fold_marker: Color,
    pub link: Color,

    // Highlights
    pub highlight_match_bg: Color,
    pub highlight_match_fg: Color,

    // Status bar
    pub status_mode_bg: Color,
    pub status_mode_fg: Color,
    pub status_help: Color,
    pub status_bg: Color,

    // Search bar
    pub search_prefix: Color,

    // Empty states / messages
    pub empty_state: Color,
    pub warning_message: Color,

    // Help overlay
    pub help_border: Color,
    pub help_bg: Color,

    // Minimap
    pub map_background: Rgba,
    pub map_plain: Rgba,
    pub map_command: Rgba,
    pub map_info: Rgba,
    pub map_warning: Rgba,
    pub map_error: Rgba,
    pub map_debug: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_theme()
    }
}

impl Theme {
    /// The default theme
    pub fn default_theme() -> Self {
        Self {
            severity_command: Color::Cyan,
            severity_info: Color::Green,
            severity_warning: Color::Yellow,
            severity_error: Color::Red,
            severity_debug: Color::Magenta,

            line_number: Color::DarkGray,
            timestamp: Color::DarkGray,
            fold_marker: Color::Cyan,
            link: Color::Blue,

            highlight_match_bg: Color::Yellow,
            highlight_match_fg: Color::Black,

            status_mode_bg: Color::Blue,
            status_mode_fg: Color::White,
            status_help: Color::DarkGray,
            status_bg: Color::Black,

            search_prefix: Color::Yellow,

            empty_state: Color::DarkGray,
            warning_message: Color::Yellow,

            help_border: Color::Cyan,
            help_bg: Color::Black,

            map_background: [24, 24, 24, 255],
            map_plain: [120, 120, 120, 255],
            map_command: [0, 200, 255, 255],
            map_info: [80, 220, 120, 255],
            map_warning: [255, 200, 0, 255],
            map_error: [255, 80, 80, 255],
            map_debug: [200, 120, 255, 255],
        }
    }

    /// Monochrome theme - grayscale only
    pub fn monochrome() -> Self {
        Self {
            severity_command: Color::Rgb(200, 200, 200),
            severity_info: Color::Rgb(170, 170, 170),
            severity_warning: Color::Rgb(220, 220, 220),
            severity_error: Color::Rgb(255, 255, 255),
            severity_debug: Color::Rgb(140, 140, 140),

            line_number: Color::Rgb(100, 100, 100),
            timestamp: Color::Rgb(100, 100, 100),
            fold_marker: Color::Rgb(200, 200, 200),
            link: Color::Rgb(220, 220, 220),

            highlight_match_bg: Color::Rgb(200, 200, 200),
            highlight_match_fg: Color::Rgb(0, 0, 0),

            status_mode_bg: Color::Rgb(200, 200, 200),
            status_mode_fg: Color::Rgb(0, 0, 0),
            status_help: Color::Rgb(120, 120, 120),
            status_bg: Color::Rgb(30, 30, 30),

            search_prefix: Color::Rgb(220, 220, 220),

            empty_state: Color::Rgb(120, 120, 120),
            warning_message: Color::Rgb(200, 200, 200),

            help_border: Color::Rgb(180, 180, 180),
            help_bg: Color::Rgb(20, 20, 20),

            map_background: [20, 20, 20, 255],
            map_plain: [110, 110, 110, 255],
            map_command: [190, 190, 190, 255],
            map_info: [160, 160, 160, 255],
            map_warning: [220, 220, 220, 255],
            map_error: [255, 255, 255, 255],
            map_debug: [130, 130, 130, 255],
        }
    }

    /// Get a theme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "monochrome" | "mono" => Self::monochrome(),
            _ => Self::default_theme(),
        }
    }

    /// Terminal color for a severity
    pub fn severity_color(&self, severity: Severity) -> Color {
        match severity {
            Severity::Command => self.severity_command,
            Severity::Info => self.severity_info,
            Severity::Warning => self.severity_warning,
            Severity::Error => self.severity_error,
            Severity::Debug => self.severity_debug,
        }
    }

    /// Minimap bar color for a severity (plain when None)
    pub fn map_color(&self, severity: Option<Severity>) -> Rgba {
        match severity {
            None => self.map_plain,
            Some(Severity::Command) => self.map_command,
            Some(Severity::Info) => self.map_info,
            Some(Severity::Warning) => self.map_warning,
            Some(Severity::Error) => self.map_error,
            Some(Severity::Debug) => self.map_debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_falls_back_to_default() {
        let theme = Theme::by_name("no-such-theme");
        assert_eq!(theme.severity_error, Color::Red);
        let mono = Theme::by_name("mono");
        assert_eq!(mono.severity_error, Color::Rgb(255, 255, 255));
    }

    #[test]
    fn test_severity_lookup() {
        let theme = Theme::default();
        assert_eq!(theme.severity_color(Severity::Warning), Color::Yellow);
        assert_eq!(theme.map_color(None), theme.map_plain);
        assert_eq!(theme.map_color(Some(Severity::Error)), theme.map_error);
    }
}
