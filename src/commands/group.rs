//! Group selection commands

use crate::error::{Error, Result};
use crate::response::NntpResponse;

/// Build GROUP command
pub fn group(newsgroup: &str) -> String {
    format!("GROUP {}\r\n", newsgroup)
}

/// Group information returned by the GROUP command
///
/// Contains the estimated article count and the low/high water marks
/// of the selected newsgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupInfo {
    /// Estimated number of articles in the group
    pub count: u64,
    /// Number of the first article
    pub low: u64,
    /// Number of the last article
    pub high: u64,
}

/// Parse GROUP response to extract article count and range
///
/// Response format: "211 count low high group-name"
pub fn parse_group_response(response: NntpResponse) -> Result<GroupInfo> {
    if !response.is_success() {
        return Err(Error::Protocol {
            code: response.code,
            message: response.message,
        });
    }

    let parts: Vec<&str> = response.message.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(Error::InvalidResponse(response.message));
    }

    let count = parts[0]
        .parse()
        .map_err(|_| Error::InvalidResponse(response.message.clone()))?;
    let low = parts[1]
        .parse()
        .map_err(|_| Error::InvalidResponse(response.message.clone()))?;
    let high = parts[2]
        .parse()
        .map_err(|_| Error::InvalidResponse(response.message.clone()))?;

    Ok(GroupInfo { count, low, high })
}
