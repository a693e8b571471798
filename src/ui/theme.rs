//! Dashboard color palettes

use crate::config::Theme;
use ratatui::style::Color;

/// Colors used by the dashboard widgets
#[derive(Debug, Clone, Copy)]
pub struct ThemeColors {
    pub bg: Color,
    pub fg: Color,
    /// Borders, timestamps and placeholders
    pub dim: Color,
    /// Double press accent
    pub cyan: Color,
    /// Single press accent
    pub green: Color,
    /// Long press accent, status messages
    pub yellow: Color,
    /// Status bar background
    pub key_off: Color,
    /// Held key background
    pub key_on: Color,
    /// Held key label
    pub key_text_on: Color,
}

impl ThemeColors {
    pub fn from_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self::dark(),
            Theme::Light => Self::light(),
        }
    }

    pub fn dark() -> Self {
        Self {
            bg: Color::Rgb(22, 22, 30),
            fg: Color::Rgb(200, 200, 210),
            dim: Color::Rgb(90, 90, 110),
            cyan: Color::Rgb(80, 200, 220),
            green: Color::Rgb(80, 200, 120),
            yellow: Color::Rgb(240, 180, 80),
            key_off: Color::Rgb(40, 40, 50),
            key_on: Color::Rgb(80, 200, 120),
            key_text_on: Color::Rgb(20, 20, 25),
        }
    }

    /// High contrast for bright terminals
    pub fn light() -> Self {
        Self {
            bg: Color::Rgb(245, 245, 248),
            fg: Color::Rgb(30, 30, 40),
            dim: Color::Rgb(130, 130, 150),
            cyan: Color::Rgb(0, 130, 160),
            green: Color::Rgb(30, 150, 70),
            yellow: Color::Rgb(180, 120, 0),
            key_off: Color::Rgb(220, 220, 228),
            key_on: Color::Rgb(30, 150, 70),
            key_text_on: Color::Rgb(255, 255, 255),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_theme_selects_palette() {
        let dark = ThemeColors::from_theme(Theme::Dark);
        let light = ThemeColors::from_theme(Theme::Light);

        assert_eq!(dark.bg, Color::Rgb(22, 22, 30));
        assert_eq!(light.bg, Color::Rgb(245, 245, 248));
    }

    #[test]
    fn kinds_have_distinct_accents() {
        for colors in [ThemeColors::dark(), ThemeColors::light()] {
            assert_ne!(colors.green, colors.cyan);
            assert_ne!(colors.cyan, colors.yellow);
            assert_ne!(colors.green, colors.yellow);
        }
    }
}
