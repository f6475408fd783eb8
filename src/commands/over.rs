//! XOVER command for fetching article overview data

/// Build XOVER command for an inclusive article-number range
pub fn xover(low: u64, high: u64) -> String {
    format!("XOVER {}-{}\r\n", low, high)
}
