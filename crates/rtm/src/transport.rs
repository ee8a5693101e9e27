use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Wire seam for one bot identity's realtime session.
///
/// Reads come from that identity's read loop only; sends may arrive from any
/// number of completing handler tasks, so implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait RtmTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Best-effort drain of newly arrived events. Empty when nothing is
    /// ready; never blocks waiting for traffic.
    async fn read_batch(&self) -> Result<Vec<Event>, TransportError>;

    async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError>;
}

/// Transport that carries no traffic. Lets the process run without a live
/// Slack session, mirroring how the server binary boots by default.
#[derive(Default)]
pub struct NoopRtmTransport;

#[async_trait]
impl RtmTransport for NoopRtmTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read_batch(&self) -> Result<Vec<Event>, TransportError> {
        Ok(Vec::new())
    }

    async fn send_message(&self, _channel: &str, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Builds the transport for each configured identity.
pub trait TransportFactory: Send + Sync {
    fn make(&self, bot_name: &str, token: &SecretString) -> Arc<dyn RtmTransport>;
}

#[derive(Default)]
pub struct NoopTransportFactory;

impl TransportFactory for NoopTransportFactory {
    fn make(&self, _bot_name: &str, _token: &SecretString) -> Arc<dyn RtmTransport> {
        Arc::new(NoopRtmTransport)
    }
}
