//! NNTP client implementation with TLS support
//!
//! One [`NntpClient`] is one NNTP session: connect, authenticate, select a
//! group, stream XOVER overview data, quit. Sessions are pooled by
//! [`NntpPool`](crate::pool::NntpPool) and leased per fetch chunk.

mod auth;
mod connection;
mod group_ops;
mod io;
mod state;

use std::sync::Arc;

use tokio::io::BufReader;
use tracing::debug;

use crate::commands;
use crate::commands::GroupInfo;
use crate::config::ServerConfig;
use connection::MaybeTlsStream;
use state::ConnectionState;

/// Async NNTP client session
///
/// # Example
///
/// ```no_run
/// use usenet_indexer::{NntpClient, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// let mut client = NntpClient::connect(Arc::new(config)).await?;
/// client.authenticate().await?;
///
/// let info = client.select_group("alt.binaries.test").await?;
/// println!("group spans {}-{}", info.low, info.high);
///
/// let lines = client.xover(info.low, info.low + 99).await?;
/// println!("fetched {} overview lines", lines.len());
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct NntpClient {
    /// Buffered TLS or plaintext stream (both reader and writer)
    stream: BufReader<MaybeTlsStream>,
    /// Connection state
    state: ConnectionState,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Currently selected newsgroup and its GROUP response
    current_group: Option<(String, GroupInfo)>,
    /// Whether this connection is broken (received garbage/invalid data)
    is_broken: bool,
}

impl NntpClient {
    /// Check if this connection is broken and should be discarded
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Mark this connection as broken
    pub(crate) fn mark_broken(&mut self) {
        self.is_broken = true;
    }

    /// Get the currently selected newsgroup, if any
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_ref().map(|(name, _)| name.as_str())
    }

    /// Check if the client is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, ConnectionState::Authenticated)
    }

    /// Close the session with a best-effort QUIT
    ///
    /// The server's 205 goodbye is read but not required; transport errors
    /// during shutdown are ignored since the socket is dropped either way.
    pub async fn close(mut self) {
        if self.send_command(commands::quit()).await.is_ok() {
            let _ = self.read_response().await;
        }
        self.state = ConnectionState::Closed;
        debug!("NNTP session closed");
    }
}
