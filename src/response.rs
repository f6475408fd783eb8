//! NNTP response types and status codes

/// NNTP response with status code, message, and optional multi-line body
#[derive(Debug, Clone)]
pub struct NntpResponse {
    /// 3-digit NNTP response code
    pub code: u16,
    /// Status message from server
    pub message: String,
    /// Multi-line response body (empty for single-line responses)
    pub lines: Vec<String>,
}

impl NntpResponse {
    /// Check if response indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Check if response indicates continuation (3xx)
    pub fn is_continuation(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Check if response indicates error (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

/// NNTP response codes (RFC 3977 subset used by the indexer)
#[allow(dead_code)]
pub mod codes {
    // 2xx - Success
    /// Server ready, posting allowed
    pub const READY_POSTING_ALLOWED: u16 = 200;
    /// Server ready, no posting
    pub const READY_NO_POSTING: u16 = 201;
    /// Closing connection
    pub const CLOSING_CONNECTION: u16 = 205;
    /// Group selected
    pub const GROUP_SELECTED: u16 = 211;
    /// Overview information follows
    pub const OVERVIEW_INFO_FOLLOWS: u16 = 224;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;

    // 3xx - Continuation
    /// Continue with authentication
    pub const AUTH_CONTINUE: u16 = 381;

    // 4xx - Temporary errors
    /// Service temporarily unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 400;
    /// No such newsgroup
    pub const NO_SUCH_GROUP: u16 = 411;
    /// No newsgroup selected
    pub const NO_GROUP_SELECTED: u16 = 412;
    /// No article(s) in that number range
    pub const NO_SUCH_ARTICLE_NUMBER: u16 = 423;
    /// Authentication required (RFC 4643)
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication rejected
    pub const AUTH_REJECTED: u16 = 481;
    /// Authentication out of sequence
    pub const AUTH_OUT_OF_SEQUENCE: u16 = 482;

    // 5xx - Permanent errors
    /// Access denied / command unavailable
    pub const ACCESS_DENIED: u16 = 502;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let response = NntpResponse {
            code: 224,
            message: "Overview information follows".to_string(),
            lines: vec![],
        };
        assert!(response.is_success());
        assert!(!response.is_continuation());
        assert!(!response.is_error());
    }

    #[test]
    fn test_is_continuation() {
        let response = NntpResponse {
            code: 381,
            message: "Continue".to_string(),
            lines: vec![],
        };
        assert!(!response.is_success());
        assert!(response.is_continuation());
        assert!(!response.is_error());
    }

    #[test]
    fn test_is_error() {
        let response = NntpResponse {
            code: 481,
            message: "Auth rejected".to_string(),
            lines: vec![],
        };
        assert!(!response.is_success());
        assert!(!response.is_continuation());
        assert!(response.is_error());
    }

    #[test]
    fn test_boundary_codes() {
        // 199 is not success
        assert!(!NntpResponse {
            code: 199,
            message: String::new(),
            lines: vec![]
        }
        .is_success());
        // 200 is success
        assert!(NntpResponse {
            code: 200,
            message: String::new(),
            lines: vec![]
        }
        .is_success());
        // 300 is not success
        assert!(!NntpResponse {
            code: 300,
            message: String::new(),
            lines: vec![]
        }
        .is_success());
    }
}
