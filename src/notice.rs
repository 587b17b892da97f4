//! User-facing notices about the outcome of operations.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeVariant {
    /// Informational or success notice.
    #[default]
    Default,
    /// Failure notice.
    Destructive,
}

/// Outcome of a user-triggered operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Short title.
    pub title: String,
    /// Details.
    pub description: String,
    /// Presentation.
    pub variant: NoticeVariant,
}

impl Notice {
    /// Success notice for `operation`.
    #[inline]
    #[must_use]
    pub fn success<D: Into<String>>(operation: &str, description: D) -> Self {
        Self {
            title: operation.to_owned(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    /// Failure notice carrying the operation name and root cause.
    #[inline]
    #[must_use]
    pub fn failure(operation: &str, error: &LedgerError) -> Self {
        Self {
            title: "Error".to_owned(),
            description: format!("{operation} failed: {error}"),
            variant: NoticeVariant::Destructive,
        }
    }

    /// Returns `true` for failure notices.
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

/// Receives notices about user-triggered operations.
pub trait Notifier: core::fmt::Debug + Send + Sync {
    /// Delivers a notice.
    fn notify(&self, notice: &Notice);
}

/// Notifier that logs notices through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    #[inline]
    fn notify(&self, notice: &Notice) {
        if notice.is_failure() {
            tracing::warn!(title = %notice.title, "{}", notice.description);
        } else {
            tracing::info!(title = %notice.title, "{}", notice.description);
        }
    }
}
