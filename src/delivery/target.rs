//! Delivery target naming

use chrono::{NaiveDate, Utc};

/// Target name selection, evaluated on every delivery.
///
/// With date suffixing enabled the name is `<base>-YYYY.MM.DD` for the
/// current UTC day, so long runs roll over at midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    base: String,
    date_suffix: bool,
}

impl IndexTarget {
    pub fn fixed(base: impl Into<String>) -> Self {
        Self { base: base.into(), date_suffix: false }
    }

    pub fn daily(base: impl Into<String>) -> Self {
        Self { base: base.into(), date_suffix: true }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_daily(&self) -> bool {
        self.date_suffix
    }

    /// Target name for the current UTC day
    pub fn resolve(&self) -> String {
        self.resolve_for(Utc::now().date_naive())
    }

    /// Target name for a given day
    pub fn resolve_for(&self, day: NaiveDate) -> String {
        if self.date_suffix {
            format!("{}-{}", self.base, day.format("%Y.%m.%d"))
        } else {
            self.base.clone()
        }
    }
}
