//! Gmail search query construction

use chrono::Duration;
use tracing::info;

use crate::models::{DateRange, MessageFilter};

const QUERY_DATE_FORMAT: &str = "%Y/%m/%d";

/// Build the `messages.list` search predicate for a run.
///
/// The range end is inclusive, so the `before:` bound is the day after it.
/// Include labels are OR-ed, exclude labels are negated and AND-ed; either
/// clause is left out when its label set is empty.
pub fn build_query(range: &DateRange, include: &MessageFilter, exclude: &MessageFilter) -> String {
    let after = range.start.format(QUERY_DATE_FORMAT).to_string();
    let before = (range.end + Duration::days(1))
        .format(QUERY_DATE_FORMAT)
        .to_string();

    let mut parts = vec![format!("after:{}", after), format!("before:{}", before)];

    if !include.labels.is_empty() {
        parts.push(
            include
                .labels
                .iter()
                .map(|label| format!("label:{}", label))
                .collect::<Vec<_>>()
                .join(" OR "),
        );
    }

    if !exclude.labels.is_empty() {
        parts.push(
            exclude
                .labels
                .iter()
                .map(|label| format!("-label:{}", label))
                .collect::<Vec<_>>()
                .join(" AND "),
        );
    }

    info!(
        after = %after,
        before = %before,
        include_labels = ?include.labels,
        exclude_labels = ?exclude.labels,
        "Built export query"
    );

    parts.join(" ")
}
