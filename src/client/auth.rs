//! NNTP authentication support (AUTHINFO USER/PASS)

use tracing::debug;

use crate::commands;
use crate::error::{Error, Result};
use crate::response::codes;

use super::NntpClient;
use super::state::ConnectionState;

impl NntpClient {
    /// Authenticate with username and password (AUTHINFO USER/PASS)
    ///
    /// Sends AUTHINFO USER followed by AUTHINFO PASS using the credentials
    /// from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`Error::Protocol`] - Already authenticated
    /// - [`Error::AuthFailed`] - Credentials rejected (481/482/502)
    /// - [`Error::ConnectionClosed`] - Server closed the connection
    /// - [`Error::Timeout`] - Server did not respond in time
    pub async fn authenticate(&mut self) -> Result<()> {
        debug!("Authenticating as {}", self.config.username);

        if matches!(self.state, ConnectionState::Authenticated) {
            return Err(Error::Protocol {
                code: 502,
                message: "Already authenticated".to_string(),
            });
        }

        // Send AUTHINFO USER
        let cmd = commands::authinfo_user(&self.config.username);
        self.send_command(&cmd).await?;
        self.state = ConnectionState::InProgress;

        let response = self.read_response().await?;

        // Expect 381 (continue) or 281 (accepted without password)
        if response.code == codes::AUTH_CONTINUE {
            let cmd = commands::authinfo_pass(&self.config.password);
            self.send_command(&cmd).await?;
            let response = self.read_response().await?;

            if response.code != codes::AUTH_ACCEPTED {
                self.state = ConnectionState::Ready;
                return Err(auth_error(response.code, response.message));
            }
        } else if response.code != codes::AUTH_ACCEPTED {
            self.state = ConnectionState::Ready;
            return Err(auth_error(response.code, response.message));
        }

        self.state = ConnectionState::Authenticated;
        debug!("Authentication successful");
        Ok(())
    }
}

/// Map an authentication response code to the right error kind
///
/// 481 (rejected), 482 (out of sequence) and 502 (access denied) are
/// credential failures and fatal for the run; anything else is a protocol
/// fault on the server side.
fn auth_error(code: u16, message: String) -> Error {
    match code {
        codes::AUTH_REJECTED | codes::AUTH_OUT_OF_SEQUENCE | codes::ACCESS_DENIED => {
            Error::AuthFailed(message)
        }
        _ => Error::Protocol { code, message },
    }
}
