//! Group selection and overview retrieval

use tracing::debug;

use crate::commands::{self, GroupInfo};
use crate::error::{Error, Result};
use crate::response::codes;

use super::NntpClient;

impl NntpClient {
    /// Select a newsgroup
    ///
    /// Sends `GROUP` and caches the result; selecting the group the session
    /// already has active skips the round trip and returns the cached
    /// [`GroupInfo`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`Error::NoSuchGroup`] - The newsgroup does not exist (411)
    /// - [`Error::Protocol`] - Server returned an unexpected error
    /// - [`Error::InvalidResponse`] - Could not parse the server response
    pub async fn select_group(&mut self, newsgroup: &str) -> Result<GroupInfo> {
        if let Some((current, info)) = &self.current_group {
            if current == newsgroup {
                return Ok(*info);
            }
        }

        debug!("Selecting newsgroup: {}", newsgroup);

        let cmd = commands::group(newsgroup);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code == codes::NO_SUCH_GROUP {
            return Err(Error::NoSuchGroup(newsgroup.to_string()));
        }

        let info = commands::parse_group_response(response)?;
        self.current_group = Some((newsgroup.to_string(), info));

        debug!(
            "Group {} selected: {} articles ({}-{})",
            newsgroup, info.count, info.low, info.high
        );
        Ok(info)
    }

    /// Fetch overview data for an inclusive article-number range
    ///
    /// Sends `XOVER low-high` and returns the raw dot-unstuffed body lines.
    /// A group must have been selected first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`Error::NoSuchRange`] - No articles in that range (423)
    /// - [`Error::Protocol`] - No group selected (412) or other server error
    /// - [`Error::Timeout`] - Server did not finish the body in time
    pub async fn xover(&mut self, low: u64, high: u64) -> Result<Vec<String>> {
        debug!("XOVER {}-{}", low, high);

        let cmd = commands::xover(low, high);
        self.send_command(&cmd).await?;
        let response = self.read_multiline_response().await?;

        match response.code {
            codes::OVERVIEW_INFO_FOLLOWS => {
                debug!("XOVER {}-{}: {} lines", low, high, response.lines.len());
                Ok(response.lines)
            }
            codes::NO_SUCH_ARTICLE_NUMBER => Err(Error::NoSuchRange { low, high }),
            _ => Err(Error::Protocol {
                code: response.code,
                message: response.message,
            }),
        }
    }
}
