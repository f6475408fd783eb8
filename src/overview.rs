//! Overview (XOVER) line parsing
//!
//! One XOVER response line carries the metadata of a single article as
//! tab-separated fields: article number, subject, from, date, message-id,
//! references, byte count, line count, then optional trailing headers such
//! as `Xref:`. Usenet overview data is noisy; parsing is tolerant and drops
//! only lines that cannot identify an article.

use chrono::DateTime;

/// One indexed article, as stored in the article index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewRow {
    /// Numeric id within the group; unique together with `group_name`
    pub article_num: u64,
    /// Newsgroup this row was fetched from
    pub group_name: String,
    /// Subject line, may be empty
    pub subject: String,
    /// Raw From header, may be empty
    pub from_addr: String,
    /// Server-supplied date field as received
    pub date_raw: String,
    /// Best-effort parse of `date_raw` to seconds since epoch
    pub date_unix: Option<i64>,
    /// Message-id, always normalized to `<...>` form
    pub message_id: String,
    /// Article size in bytes, when the server supplied a parseable value
    pub bytes_len: Option<u64>,
    /// Article line count, when the server supplied a parseable value
    pub line_count: Option<u32>,
    /// Trailing `Xref:` field captured verbatim, empty when absent
    pub xref: String,
}

/// Parse one raw XOVER line into an [`OverviewRow`]
///
/// Returns `None` for lines that must be dropped: fewer than 8 tab-separated
/// fields, an unparseable article number, or an empty message-id. Callers
/// count dropped lines in their `parse_errors` metric.
///
/// Numeric byte/line fields that fail to parse become `None`; date parse
/// failures yield `date_unix = None` while `date_raw` is preserved.
pub fn parse_overview_line(group: &str, line: &str) -> Option<OverviewRow> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return None;
    }

    let article_num = fields[0].trim().parse::<u64>().ok()?;
    let message_id = normalize_message_id(fields[4])?;

    let date_raw = fields[3].to_string();
    let date_unix = parse_overview_date(&date_raw);

    // Optional headers after the 8 mandatory fields; Xref is the only one
    // the index keeps.
    let xref = fields[8..]
        .iter()
        .find(|f| f.trim_start().starts_with("Xref:"))
        .map(|f| f.to_string())
        .unwrap_or_default();

    Some(OverviewRow {
        article_num,
        group_name: group.to_string(),
        subject: fields[1].to_string(),
        from_addr: fields[2].to_string(),
        date_raw,
        date_unix,
        message_id,
        bytes_len: fields[6].trim().parse().ok(),
        line_count: fields[7].trim().parse().ok(),
        xref,
    })
}

/// Normalize a message-id field to `<...>` form
///
/// Missing angle brackets are accepted and added; empty ids are rejected.
fn normalize_message_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "<>" {
        return None;
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        return Some(trimmed.to_string());
    }

    let bare = trimmed.trim_start_matches('<').trim_end_matches('>');
    if bare.is_empty() {
        return None;
    }
    Some(format!("<{}>", bare))
}

/// Best-effort parse of an overview date field (RFC 5322 / 2822 forms)
///
/// chrono handles the obsolete named zones (`GMT`, `UT`, ...) directly; a
/// numeric-zone rewrite is attempted as a fallback for servers that emit
/// otherwise-valid dates chrono rejects.
fn parse_overview_date(raw: &str) -> Option<i64> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(candidate) {
        return Some(dt.timestamp());
    }

    for zone in ["GMT", "UT"] {
        if let Some(prefix) = candidate.strip_suffix(zone) {
            if let Ok(dt) = DateTime::parse_from_rfc2822(&format!("{}+0000", prefix)) {
                return Some(dt.timestamp());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "alt.binaries.test";

    #[test]
    fn test_parse_full_line() {
        let line = "12345\tTest Subject (1/3)\tAlice <a@x>\tMon, 01 Jan 2024 00:00:00 +0000\t<m1@x>\t<ref@x>\t768000\t50\tXref: news.example.com alt.binaries.test:12345";
        let row = parse_overview_line(GROUP, line).unwrap();

        assert_eq!(row.article_num, 12345);
        assert_eq!(row.group_name, GROUP);
        assert_eq!(row.subject, "Test Subject (1/3)");
        assert_eq!(row.from_addr, "Alice <a@x>");
        assert_eq!(row.date_unix, Some(1_704_067_200));
        assert_eq!(row.message_id, "<m1@x>");
        assert_eq!(row.bytes_len, Some(768_000));
        assert_eq!(row.line_count, Some(50));
        assert_eq!(row.xref, "Xref: news.example.com alt.binaries.test:12345");
    }

    #[test]
    fn test_short_line_dropped() {
        assert!(parse_overview_line(GROUP, "12345\tonly\tfour\tfields").is_none());
        assert!(parse_overview_line(GROUP, "").is_none());
    }

    #[test]
    fn test_bad_article_number_dropped() {
        let line = "not-a-number\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t<m@x>\t\t1\t1";
        assert!(parse_overview_line(GROUP, line).is_none());
    }

    #[test]
    fn test_empty_message_id_dropped() {
        let line = "1\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t\t\t1\t1";
        assert!(parse_overview_line(GROUP, line).is_none());

        let line = "1\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t<>\t\t1\t1";
        assert!(parse_overview_line(GROUP, line).is_none());
    }

    #[test]
    fn test_message_id_without_brackets_normalized() {
        let line = "1\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\tm1@x\t\t1\t1";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.message_id, "<m1@x>");
    }

    #[test]
    fn test_unparseable_numeric_fields_become_null() {
        let line = "7\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t<m@x>\t\tnot-bytes\tnot-lines";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.bytes_len, None);
        assert_eq!(row.line_count, None);
    }

    #[test]
    fn test_bad_date_preserved_raw() {
        let line = "7\ts\tf\tyesterday-ish\t<m@x>\t\t1\t1";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.date_unix, None);
        assert_eq!(row.date_raw, "yesterday-ish");
    }

    #[test]
    fn test_gmt_zone_accepted() {
        let line = "7\ts\tf\tMon, 01 Jan 2024 00:00:00 GMT\t<m@x>\t\t1\t1";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.date_unix, Some(1_704_067_200));
    }

    #[test]
    fn test_missing_xref_is_empty() {
        let line = "7\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t<m@x>\t\t1\t1";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.xref, "");
    }

    #[test]
    fn test_xref_found_among_trailing_headers() {
        let line = "7\ts\tf\tMon, 01 Jan 2024 00:00:00 +0000\t<m@x>\t\t1\t1\tNewsgroups: misc\tXref: srv alt.test:7";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.xref, "Xref: srv alt.test:7");
    }

    #[test]
    fn test_empty_subject_and_from_accepted() {
        let line = "7\t\t\tMon, 01 Jan 2024 00:00:00 +0000\t<m@x>\t\t1\t1";
        let row = parse_overview_line(GROUP, line).unwrap();
        assert_eq!(row.subject, "");
        assert_eq!(row.from_addr, "");
    }
}
