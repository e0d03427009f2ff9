//! Synthetic `GmExport-*` headers prepended to exported messages

use crate::models::RawMessage;

/// Maximum rendered header line length, continuation lines included
pub const MAX_LINE_LEN: usize = 78;

const CRLF: &str = "\r\n";

/// Render `Name: Value`, soft-wrapping the value at [`MAX_LINE_LEN`] columns.
///
/// The first line carries as much of the value as fits after `Name: `; each
/// continuation line is a single space followed by up to 77 value characters.
pub fn fold_header(name: &str, value: &str) -> String {
    let prefix = format!("{}: ", name);
    let value: Vec<char> = value.chars().collect();
    let prefix_len = prefix.chars().count();

    if prefix_len + value.len() <= MAX_LINE_LEN {
        return format!("{}{}", prefix, value.iter().collect::<String>());
    }

    let first_len = MAX_LINE_LEN.saturating_sub(prefix_len).min(value.len());
    let mut folded = prefix;
    folded.extend(&value[..first_len]);

    for chunk in value[first_len..].chunks(MAX_LINE_LEN - 1) {
        folded.push_str(CRLF);
        folded.push(' ');
        folded.extend(chunk);
    }

    folded
}

/// Provider metadata as `(name, value)` pairs, in a fixed order
pub fn synthetic_headers(message: &RawMessage) -> Vec<(&'static str, String)> {
    let opt = |v: Option<String>| v.unwrap_or_default();

    vec![
        ("GmExport-Id", message.id.clone()),
        ("GmExport-LabelIds", message.label_ids.join(",")),
        ("GmExport-ThreadId", opt(message.thread_id.clone())),
        ("GmExport-Snippet", opt(message.snippet.clone())),
        (
            "GmExport-SizeEstimate",
            opt(message.size_estimate.map(|s| s.to_string())),
        ),
        (
            "GmExport-HistoryId",
            opt(message.history_id.map(|h| h.to_string())),
        ),
        (
            "GmExport-InternalDate",
            opt(message.internal_date.map(|d| d.to_string())),
        ),
    ]
}

/// Folded synthetic headers followed by the raw message bytes
pub fn compose_artifact(message: &RawMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.raw.len() + 512);
    for (name, value) in synthetic_headers(message) {
        out.extend_from_slice(fold_header(name, &value).as_bytes());
        out.extend_from_slice(CRLF.as_bytes());
    }
    out.extend_from_slice(&message.raw);
    out
}
