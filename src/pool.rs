//! Connection pooling for NNTP sessions using bb8
//!
//! The pool is the only shared mutable structure of a fetch run: a fixed
//! number of lazily-constructed, authenticated sessions, each leased
//! exclusively for the duration of one chunk. Connections flagged broken
//! (garbage data, aborted reads) are discarded on return and replaced on
//! the next acquisition.

use std::sync::Arc;
use std::time::Duration;

use bb8::{Pool, PooledConnection};
use tracing::debug;

use crate::client::NntpClient;
use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// How long a lease request may wait for a pooled connection
const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 120;

/// Idle connections are closed after five minutes
const POOL_IDLE_TIMEOUT_SECS: u64 = 300;

/// Connection manager for bb8 pool
pub struct NntpConnectionManager {
    config: Arc<ServerConfig>,
}

impl NntpConnectionManager {
    /// Create a new connection manager
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl bb8::ManageConnection for NntpConnectionManager {
    type Connection = NntpClient;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection> {
        let mut client = NntpClient::connect(self.config.clone()).await?;
        client.authenticate().await?;
        debug!("New pooled connection authenticated");
        Ok(client)
    }

    async fn is_valid(&self, _conn: &mut Self::Connection) -> Result<()> {
        // Leases are short (one chunk); staleness surfaces as a retryable
        // transport error on first use
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

/// NNTP connection pool
///
/// # Example
///
/// ```no_run
/// use usenet_indexer::{NntpPool, ServerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
///
/// // Pool sized to the fetch concurrency cap
/// let pool = NntpPool::new(config, 10).await?;
///
/// let mut conn = pool.get().await?;
/// conn.select_group("alt.binaries.test").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NntpPool {
    pool: Pool<NntpConnectionManager>,
}

impl NntpPool {
    /// Create a new NNTP connection pool
    ///
    /// Connections are opened lazily on first acquisition, up to `max_size`.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `max_size` - Maximum number of connections in the pool; match this
    ///   to the fetch orchestrator's `max_workers`
    pub async fn new(config: ServerConfig, max_size: u32) -> Result<Self> {
        debug!(
            "Creating NNTP connection pool for {}:{} (max size: {})",
            config.host, config.port, max_size
        );

        let manager = NntpConnectionManager::new(config);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build(manager)
            .await
            .map_err(|e| Error::Other(format!("Failed to create pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    ///
    /// Chunk-level retry with backoff is the fetch orchestrator's job; a
    /// lease failure here surfaces as one retryable attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if unable to get a connection from the pool.
    /// The underlying error may be a connection failure, authentication
    /// failure, or pool exhaustion.
    pub async fn get(&self) -> Result<PooledConnection<'_, NntpConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Other(format!("Failed to get connection from pool: {}", e)))
    }

    /// Consume the wrapper and return the underlying bb8 pool
    ///
    /// The fetch orchestrator is generic over `bb8::Pool` so it can run
    /// against mock connection managers in tests.
    pub fn into_inner(self) -> Pool<NntpConnectionManager> {
        self.pool
    }

    /// Get the number of connections currently in use
    pub fn connections_in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }

    /// Get the number of idle connections available
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_manager_creation() {
        let config = ServerConfig::tls("news.example.com", "testuser", "testpass");
        let manager = NntpConnectionManager::new(config);
        assert_eq!(manager.config.host, "news.example.com");
        assert_eq!(manager.config.port, 563);
    }

    #[test]
    fn test_pool_timeout_constants() {
        assert_eq!(POOL_ACQUIRE_TIMEOUT_SECS, 120);
        assert_eq!(POOL_IDLE_TIMEOUT_SECS, 300);
    }
}
