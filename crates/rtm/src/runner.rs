use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection::{BotConnection, ConnectionRegistry};
use crate::dispatch::Dispatcher;
use crate::transport::TransportError;

/// Retry budget for re-establishing a session after a read failure. The
/// budget resets on every successful read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Drives one polling read loop per configured bot identity.
///
/// Loops for different identities run fully independently: each is its own
/// detached task, and none ever waits on a handler or on a sibling loop.
pub struct RtmRunner {
    connections: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    read_interval: Duration,
    reconnect_policy: ReconnectPolicy,
}

impl RtmRunner {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        dispatcher: Arc<Dispatcher>,
        read_interval: Duration,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { connections, dispatcher, read_interval, reconnect_policy }
    }

    /// Connects every identity, then spawns the per-bot read loops. A
    /// connect failure here is fatal; startup aborts before any loop runs.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, TransportError> {
        self.connections.connect_all().await?;

        let handles = self
            .connections
            .connections()
            .map(|connection| {
                let bot_loop = BotLoop {
                    connection: Arc::clone(connection),
                    dispatcher: Arc::clone(&self.dispatcher),
                    read_interval: self.read_interval,
                    reconnect_policy: self.reconnect_policy.clone(),
                };
                tokio::spawn(async move { bot_loop.run().await })
            })
            .collect();
        Ok(handles)
    }
}

struct BotLoop {
    connection: Arc<BotConnection>,
    dispatcher: Arc<Dispatcher>,
    read_interval: Duration,
    reconnect_policy: ReconnectPolicy,
}

impl BotLoop {
    async fn run(self) {
        let bot = self.connection.name();
        info!(bot, "read loop started");
        let mut attempt: u32 = 0;

        loop {
            match self.connection.read_batch().await {
                Ok(events) => {
                    attempt = 0;
                    for event in events {
                        self.dispatcher.dispatch(bot, &event);
                    }
                }
                Err(error) => {
                    warn!(bot, error = %error, "read failed; attempting reconnect");
                    if !self.reconnect(&mut attempt).await {
                        warn!(bot, "reconnect retries exhausted; stopping this bot's read loop");
                        return;
                    }
                    continue;
                }
            }
            tokio::time::sleep(self.read_interval).await;
        }
    }

    /// Re-establishes the session with exponential backoff. Returns false
    /// once the retry budget is spent.
    async fn reconnect(&self, attempt: &mut u32) -> bool {
        let bot = self.connection.name();
        loop {
            if *attempt >= self.reconnect_policy.max_retries {
                return false;
            }
            let delay = self.reconnect_policy.backoff(*attempt);
            *attempt += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.connection.connect().await {
                Ok(()) => return true,
                Err(error) => {
                    warn!(bot, attempt = *attempt, error = %error, "reconnect attempt failed");
                }
            }
        }
    }
}
