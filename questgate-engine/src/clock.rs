use chrono::{DateTime, Utc};

/// Source of "now" for goal expiry checks.
///
/// A fixed clock makes expiry deterministic in tests and reproducible runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock {
    fixed: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn system() -> Self {
        Self { fixed: None }
    }

    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self { fixed: Some(now) }
    }

    /// Fixed clock from unix seconds. Out-of-range values fall back to the system
    /// clock; [`crate::EngineConfig::with_env`] rejects them before they get here.
    pub fn from_unix_secs(secs: i64) -> Self {
        Self {
            fixed: DateTime::from_timestamp(secs, 0),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }
}
