use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use switchboard_core::config::SlackConfig;

use crate::event::Event;
use crate::transport::{RtmTransport, TransportError, TransportFactory};

/// Fatal setup failures. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("at least one Slack token must be configured under `slack.token` or `slack.bots`")]
    NoCredentials,
    #[error("handler registration references unknown bot `{bot}`")]
    UnknownBot { bot: String },
    #[error("invalid message pattern `{pattern}`: {source}")]
    InvalidPattern { pattern: String, source: regex::Error },
}

/// Reply delivery failure. Reported, never fatal to the read loop.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("reply targets unknown bot `{bot}`")]
    UnknownBot { bot: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One long-lived realtime session, exclusively owned by its identity.
pub struct BotConnection {
    name: String,
    transport: Arc<dyn RtmTransport>,
}

impl BotConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    pub async fn read_batch(&self) -> Result<Vec<Event>, TransportError> {
        self.transport.read_batch().await
    }

    pub async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.transport.send_message(channel, text).await
    }
}

/// Owns the credential-to-connection mapping: exactly one connection per
/// configured bot identity, created at startup and kept for the process
/// lifetime.
pub struct ConnectionRegistry {
    connections: BTreeMap<String, Arc<BotConnection>>,
}

impl ConnectionRegistry {
    pub fn from_config(
        slack: &SlackConfig,
        factory: &dyn TransportFactory,
    ) -> Result<Self, SetupError> {
        let tokens = slack.bot_tokens();
        let transports = tokens
            .iter()
            .map(|(bot_name, token)| (bot_name.clone(), factory.make(bot_name, token)))
            .collect();
        Self::with_transports(transports)
    }

    /// Direct constructor for callers that already hold transports, such as
    /// tests and adapters.
    pub fn with_transports(
        transports: BTreeMap<String, Arc<dyn RtmTransport>>,
    ) -> Result<Self, SetupError> {
        if transports.is_empty() {
            return Err(SetupError::NoCredentials);
        }

        let connections = transports
            .into_iter()
            .map(|(name, transport)| {
                let connection = Arc::new(BotConnection { name: name.clone(), transport });
                (name, connection)
            })
            .collect();
        Ok(Self { connections })
    }

    pub fn bot_names(&self) -> BTreeSet<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn contains(&self, bot_name: &str) -> bool {
        self.connections.contains_key(bot_name)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Arc<BotConnection>> {
        self.connections.values()
    }

    /// Establishes every configured session. Fatal at startup if any
    /// identity cannot connect.
    pub async fn connect_all(&self) -> Result<(), TransportError> {
        for connection in self.connections.values() {
            connection.connect().await?;
        }
        Ok(())
    }

    /// Drains newly available events for one identity.
    pub async fn read(&self, bot_name: &str) -> Result<Vec<Event>, TransportError> {
        let Some(connection) = self.connections.get(bot_name) else {
            return Err(TransportError::Receive(format!("unknown bot `{bot_name}`")));
        };
        connection.read_batch().await
    }

    /// Posts an outbound message on one identity's session.
    pub async fn send_reply(
        &self,
        bot_name: &str,
        channel: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let Some(connection) = self.connections.get(bot_name) else {
            return Err(DeliveryError::UnknownBot { bot: bot_name.to_string() });
        };
        connection.send_message(channel, text).await.map_err(DeliveryError::from)
    }
}
