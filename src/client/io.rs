//! Low-level I/O operations for NNTP protocol communication
//!
//! Command transmission, single-line response parsing and dot-terminated
//! multi-line response handling. All reads decode with lossy UTF-8: Usenet
//! headers are frequently mis-encoded and a replacement character is better
//! than a dropped chunk.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::trace;

use crate::commands;
use crate::error::{Error, Result};
use crate::response::NntpResponse;

use super::NntpClient;

/// Timeout for a complete multi-line body (XOVER over a 100k chunk is large)
const MULTILINE_TIMEOUT: Duration = Duration::from_secs(180);

/// Strip NNTP byte-stuffing from a line (leading ".." becomes ".").
fn strip_byte_stuffing(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}

impl NntpClient {
    /// Send a command to the server
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("Sending command: {}", command.trim());
        self.stream.get_mut().write_all(command.as_bytes()).await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }

    /// Read a single-line response
    ///
    /// Uses the per-connection socket timeout from the server configuration.
    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        let single_line_timeout = self.config.timeout;
        let result = self.read_response_with_timeout(single_line_timeout).await;
        // Mark connection as broken if we got invalid/garbage data
        if let Err(Error::InvalidResponse(_)) = &result {
            self.mark_broken();
        }
        result
    }

    /// Read a single-line response with custom timeout
    async fn read_response_with_timeout(
        &mut self,
        timeout_duration: Duration,
    ) -> Result<NntpResponse> {
        use tokio::io::AsyncBufReadExt;

        let read_future = async {
            let mut line_bytes = Vec::with_capacity(512);
            self.stream.read_until(b'\n', &mut line_bytes).await?;

            if line_bytes.is_empty() {
                return Err(Error::ConnectionClosed);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end();
            trace!("Received: {}", line);

            commands::parse_single_response(line)
        };

        timeout(timeout_duration, read_future)
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Read a multi-line response (ending with ".\r\n")
    ///
    /// Error responses (4xx/5xx) carry no body and return immediately.
    /// Body lines are CRLF-trimmed and dot-unstuffed.
    pub(super) async fn read_multiline_response(&mut self) -> Result<NntpResponse> {
        use tokio::io::AsyncBufReadExt;

        let read_future = async {
            // Read first line (status)
            let mut first_line_bytes = Vec::with_capacity(512);
            self.stream.read_until(b'\n', &mut first_line_bytes).await?;

            if first_line_bytes.is_empty() {
                return Err(Error::ConnectionClosed);
            }

            let first_line = String::from_utf8_lossy(&first_line_bytes);
            let first_line = first_line.trim_end();
            trace!("Received: {}", first_line);

            let (code, message) = commands::parse_response_line(first_line)?;

            // If error response, no multi-line data follows
            if code >= 400 {
                return Ok(NntpResponse {
                    code,
                    message,
                    lines: vec![],
                });
            }

            // Pre-allocate generously: overview chunks run to tens of
            // thousands of lines
            let mut lines = Vec::with_capacity(1024);
            loop {
                let mut line_bytes = Vec::with_capacity(512);
                self.stream.read_until(b'\n', &mut line_bytes).await?;

                if line_bytes.is_empty() {
                    return Err(Error::ConnectionClosed);
                }

                let line = String::from_utf8_lossy(&line_bytes);
                let line = line.trim_end_matches(['\r', '\n']);

                // Check for terminator
                if line == "." {
                    break;
                }

                lines.push(strip_byte_stuffing(line).to_string());
            }

            Ok(NntpResponse {
                code,
                message,
                lines,
            })
        };

        let result = timeout(MULTILINE_TIMEOUT, read_future)
            .await
            .map_err(|_| Error::Timeout)?;

        // Mark connection as broken if we got invalid/garbage data
        if let Err(Error::InvalidResponse(_)) = &result {
            self.mark_broken();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_timeout_value() {
        assert_eq!(MULTILINE_TIMEOUT, Duration::from_secs(180));
    }

    /// Dot-stuffing removal mandated by RFC 3977: lines starting with ".."
    /// lose one leading dot; the bare terminator is handled separately.
    #[test]
    fn test_dot_stuffing_removal() {
        assert_eq!(strip_byte_stuffing("Hello world"), "Hello world");
        assert_eq!(
            strip_byte_stuffing("..This line starts with a dot"),
            ".This line starts with a dot"
        );
        assert_eq!(strip_byte_stuffing("."), ".");
        assert_eq!(strip_byte_stuffing("..."), "..");
    }

    #[test]
    fn test_line_trimming() {
        assert_eq!("200 OK\r\n".trim_end_matches(['\r', '\n']), "200 OK");
        assert_eq!("200 OK\n".trim_end_matches(['\r', '\n']), "200 OK");
        // Body lines may end in whitespace that is significant for
        // tab-separated overview fields; only CR/LF are stripped
        assert_eq!("field\t\r\n".trim_end_matches(['\r', '\n']), "field\t");
    }

    #[test]
    fn test_utf8_lossy_conversion() {
        let bytes = b"Hello \xFF world";
        let s = String::from_utf8_lossy(bytes);
        assert!(s.contains("Hello"));
        assert!(s.contains('\u{FFFD}'));
    }
}
