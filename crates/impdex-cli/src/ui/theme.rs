//! UI Theme - colors and icons used by terminal output

use crossterm::style::Color;

/// Default theme for impdex output
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
}

/// Color scheme for UI elements
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Package names
    pub package_name: Color,
    /// Versions, filenames and other secondary info
    pub secondary: Color,
    /// Section headers
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            package_name: Color::Cyan,
            secondary: Color::DarkGrey,
            header: Color::White,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
        }
    }
}

/// Status icons
#[derive(Debug, Clone)]
pub struct Icons {
    /// Record written (✓)
    pub success: &'static str,
    /// Record already cataloged (=)
    pub unchanged: &'static str,
    /// Retrying (↻)
    pub retry: &'static str,
    /// Archive skipped (✗)
    pub error: &'static str,
    /// Warning or diagnostic (⚠)
    pub warning: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            success: "✓",
            unchanged: "=",
            retry: "↻",
            error: "✗",
            warning: "⚠",
        }
    }
}

/// Pluralize a count: `1 archive`, `2 archives`.
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0, "archive"), "0 archives");
        assert_eq!(plural(1, "archive"), "1 archive");
        assert_eq!(plural(12, "package"), "12 packages");
    }

    #[test]
    fn test_theme_defaults() {
        let theme = Theme::default();
        assert_eq!(theme.icons.success, "✓");
        assert_eq!(theme.colors.error, Color::Red);
    }
}
