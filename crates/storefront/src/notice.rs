//! User-facing notices.
//!
//! Every outcome the customer needs to see (toast, banner, inline alert) is
//! expressed as a [`Notice`] so the presentation layer never inspects error
//! types directly.

use serde::Serialize;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A message for the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title)
    }

    #[must_use]
    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title)
    }

    #[must_use]
    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title)
    }

    #[must_use]
    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title)
    }

    /// Attach a longer description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.level, NoticeLevel::Error)
    }
}
