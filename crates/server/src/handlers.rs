//! Demo handlers registered by the default binary: an event logger and a
//! ping responder, one pair per configured identity.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use switchboard_rtm::{
    Event, EventHandler, HandlerError, HandlerRegistry, MessageCaptures, MessageHandler,
    RegistrationSpec, SetupError,
};

struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        info!(event_type = event.event_type().unwrap_or("unknown"), "event received");
        Ok(())
    }
}

struct Ping;

#[async_trait]
impl MessageHandler for Ping {
    async fn handle(
        &self,
        _event: Event,
        _text: String,
        _captures: MessageCaptures,
    ) -> Result<Option<String>, HandlerError> {
        Ok(Some("pong".to_string()))
    }
}

pub fn register_defaults(
    registry: &HandlerRegistry,
    bot_names: &BTreeSet<String>,
) -> Result<(), SetupError> {
    for bot_name in bot_names {
        registry
            .register(RegistrationSpec::on_event(Arc::new(EventLogger)).bot(bot_name.as_str()))?;
        registry.register(
            RegistrationSpec::on_message_pattern("^ping$", Arc::new(Ping)).bot(bot_name.as_str()),
        )?;
    }
    Ok(())
}
