//! Temporal state of a single field: the value in force now, the values it
//! replaced, and the values queued to replace it on a later date.

use std::mem;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::start_of_day;
use crate::ids::Actor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub changed_at: OffsetDateTime,
    pub changed_by: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FutureChange {
    pub value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_by: Actor,
}

/// Outcome of promoting due future changes on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub previous_value: String,
    pub promoted_value: String,
    /// Number of queued changes consumed, including overdue ones that were superseded.
    pub consumed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub name: String,
    #[serde(default)]
    pub current_value: String,
    /// Append-only, in insertion order.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Ascending by effective date, at most one entry per calendar date.
    #[serde(default)]
    pub future_changes: Vec<FutureChange>,
}

impl FieldState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the current value right away. Returns `false` when the value is
    /// unchanged, in which case nothing is recorded.
    pub fn apply_immediate(&mut self, value: &str, now: OffsetDateTime, actor: &Actor) -> bool {
        if self.current_value == value {
            return false;
        }
        let previous = mem::replace(&mut self.current_value, value.to_string());
        self.history.push(HistoryEntry {
            value: previous,
            changed_at: now,
            changed_by: actor.clone(),
        });
        true
    }

    /// Queue `value` to take effect on the calendar date of `effective_date`.
    /// Any change already queued for that date is replaced. Returns `true`
    /// if something was replaced.
    pub fn schedule(
        &mut self,
        value: &str,
        effective_date: OffsetDateTime,
        now: OffsetDateTime,
        actor: &Actor,
    ) -> bool {
        let effective_date = start_of_day(effective_date);
        let before = self.future_changes.len();
        self.future_changes
            .retain(|change| start_of_day(change.effective_date) != effective_date);
        let replaced = self.future_changes.len() != before;

        self.future_changes.push(FutureChange {
            value: value.to_string(),
            effective_date,
            created_at: now,
            created_by: actor.clone(),
        });
        self.future_changes.sort_by_key(|change| change.effective_date);
        replaced
    }

    pub fn has_due(&self, now: OffsetDateTime) -> bool {
        self.future_changes.iter().any(|c| c.effective_date <= now)
    }

    /// Move the latest-dated due change into the current value, archive the
    /// value it replaces, and drop every due change. Overdue changes that are
    /// superseded by a later due change leave no history of their own.
    pub fn promote_due(&mut self, now: OffsetDateTime, actor: &Actor) -> Option<Promotion> {
        let latest_due = self
            .future_changes
            .iter()
            .filter(|c| c.effective_date <= now)
            .max_by_key(|c| c.effective_date)?
            .value
            .clone();

        let previous = mem::replace(&mut self.current_value, latest_due);
        self.history.push(HistoryEntry {
            value: previous.clone(),
            changed_at: now,
            changed_by: actor.clone(),
        });

        let before = self.future_changes.len();
        self.future_changes.retain(|c| c.effective_date > now);

        Some(Promotion {
            previous_value: previous,
            promoted_value: self.current_value.clone(),
            consumed: before - self.future_changes.len(),
        })
    }

    /// Whether the queue is strictly ascending by calendar date.
    pub fn is_well_ordered(&self) -> bool {
        self.future_changes.windows(2).all(|pair| {
            start_of_day(pair[0].effective_date) < start_of_day(pair[1].effective_date)
        })
    }
}
