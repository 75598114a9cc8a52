use std::sync::Arc;

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::CoreError;

/// Source of "now" for edits and reconciliation passes.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start.to_offset(UtcOffset::UTC))),
        }
    }

    pub fn set(&self, instant: OffsetDateTime) {
        *self.now.lock() = instant.to_offset(UtcOffset::UTC);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Truncate an instant to midnight UTC of its calendar date.
pub fn start_of_day(instant: OffsetDateTime) -> OffsetDateTime {
    instant.to_offset(UtcOffset::UTC).date().midnight().assume_utc()
}

/// Parse an effective date given either as `YYYY-MM-DD` or as an RFC 3339
/// timestamp. The result is always midnight UTC of that calendar date.
pub fn parse_effective_date(input: &str) -> Result<OffsetDateTime, CoreError> {
    let input = input.trim();
    if let Ok(instant) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(start_of_day(instant));
    }
    Date::parse(input, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|e| CoreError::InvalidEffectiveDate(format!("{input:?}: {e}")))
}

/// Serde adapter for optional effective dates on incoming edits.
/// Missing, null and empty values all mean "apply immediately".
pub mod effective_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_effective_date(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
