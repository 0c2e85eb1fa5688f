//! Report windows and page cursors

use serde::{Deserialize, Serialize};

/// Date range requested from the reporting API
///
/// Both bounds are API date tokens: absolute (`2024-01-31`) or symbolic
/// (`30DaysAgo`, `yesterday`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    start_date: String,
    end_date: String,
}

impl ReportWindow {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    pub fn end_date(&self) -> &str {
        &self.end_date
    }

    pub fn starts_at(&self, token: &str) -> bool {
        self.start_date == token
    }
}

impl std::fmt::Display for ReportWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start_date, self.end_date)
    }
}

/// Position of the next page inside a window
///
/// `Start` and a token that happens to read `"0"` are different cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum PageCursor {
    #[default]
    Start,
    Token(String),
}

impl PageCursor {
    pub fn token(&self) -> Option<&str> {
        match self {
            PageCursor::Start => None,
            PageCursor::Token(token) => Some(token),
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, PageCursor::Start)
    }
}

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageCursor::Start => f.write_str("<start>"),
            PageCursor::Token(token) => f.write_str(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_token_is_not_start() {
        let zero = PageCursor::Token("0".to_string());
        assert!(!zero.is_start());
        assert_ne!(zero, PageCursor::Start);
        assert_eq!(zero.token(), Some("0"));
        assert_eq!(PageCursor::default().token(), None);
    }

    #[test]
    fn test_window_display() {
        let window = ReportWindow::new("30DaysAgo", "yesterday");
        assert_eq!(window.to_string(), "30DaysAgo..yesterday");
        assert!(window.starts_at("30DaysAgo"));
        assert!(!window.starts_at("1DaysAgo"));
    }
}
