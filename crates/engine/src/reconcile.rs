//! Promotion of due future changes.

use time::OffsetDateTime;
use tracing::debug;

use fieldline_core::{Actor, Record};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub started_at: OffsetDateTime,
    pub scanned: usize,
    pub promoted_records: usize,
    pub promoted_fields: usize,
    pub failures: usize,
}

impl PassReport {
    pub fn new(started_at: OffsetDateTime) -> Self {
        Self {
            started_at,
            scanned: 0,
            promoted_records: 0,
            promoted_fields: 0,
            failures: 0,
        }
    }
}

/// Promote every due change in `record` as of `now`. Returns the number of
/// fields whose current value was replaced; when non-zero, `updated_at` is
/// set to `now`.
pub fn promote_record(record: &mut Record, now: OffsetDateTime, actor: &Actor) -> usize {
    let record_id = record.id;
    let mut promoted = 0;
    for (category_id, field_id, state) in record.fields_mut() {
        if let Some(promotion) = state.promote_due(now, actor) {
            debug!(
                %record_id,
                category = category_id,
                field = field_id,
                consumed = promotion.consumed,
                "Promoted future change"
            );
            promoted += 1;
        }
    }
    if promoted > 0 {
        record.updated_at = now;
    }
    promoted
}
