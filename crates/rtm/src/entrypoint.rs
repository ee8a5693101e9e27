use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::connection::SetupError;
use crate::event::Event;

/// Failure raised by a single handler invocation. Isolated to that
/// invocation: siblings, the read loop, and the process are unaffected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("handler failure ({kind}): {message}")]
pub struct HandlerError {
    /// Failure kind, matched against a registration's expected failures to
    /// pick the reporting severity.
    pub kind: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

/// Handler bound through the generic event entrypoint. The return value is
/// never propagated anywhere.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), HandlerError>;
}

/// Handler bound through the message entrypoint. A non-empty returned
/// string is sent back as a reply to the originating channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        event: Event,
        text: String,
        captures: MessageCaptures,
    ) -> Result<Option<String>, HandlerError>;
}

/// Capture bindings extracted by a matched message pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageCaptures {
    /// Unnamed groups in pattern order; populated only when the pattern has
    /// no named groups. Optional groups that did not participate are `None`.
    pub positional: Vec<Option<String>>,
    /// Named groups that matched. When any named group exists in the
    /// pattern, unnamed groups are dropped.
    pub named: BTreeMap<String, String>,
}

impl MessageCaptures {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Message pattern compiled once at registration time. Matching is
/// anchored: the match must begin at offset zero but need not consume the
/// whole text.
#[derive(Clone, Debug)]
pub struct MessagePattern {
    regex: Regex,
    has_named_groups: bool,
}

impl MessagePattern {
    pub fn compile(pattern: &str) -> Result<Self, SetupError> {
        let regex = Regex::new(pattern).map_err(|source| SetupError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let has_named_groups = regex.capture_names().flatten().next().is_some();
        Ok(Self { regex, has_named_groups })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn captures(&self, text: &str) -> Option<MessageCaptures> {
        let caps = self.regex.captures(text)?;
        let starts_at_zero = caps.get(0).is_some_and(|full| full.start() == 0);
        if !starts_at_zero {
            return None;
        }

        if self.has_named_groups {
            let named = self
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name).map(|group| (name.to_string(), group.as_str().to_string()))
                })
                .collect();
            Some(MessageCaptures { positional: Vec::new(), named })
        } else {
            let positional = caps
                .iter()
                .skip(1)
                .map(|group| group.map(|g| g.as_str().to_string()))
                .collect();
            Some(MessageCaptures { positional, named: BTreeMap::new() })
        }
    }
}

/// Filter and argument-binding strategy of one registration.
pub enum Entrypoint {
    Event { event_type: Option<String>, handler: Arc<dyn EventHandler> },
    Message { pattern: Option<MessagePattern>, handler: Arc<dyn MessageHandler> },
}

/// What a matched registration hands to its spawned task.
pub enum Invocation {
    Event {
        handler: Arc<dyn EventHandler>,
    },
    Message {
        handler: Arc<dyn MessageHandler>,
        text: String,
        captures: MessageCaptures,
    },
}

impl Entrypoint {
    /// Evaluates the filter against one inbound event. `None` is the
    /// filtered-out no-op, not an error.
    pub fn bind(&self, event: &Event) -> Option<Invocation> {
        match self {
            Self::Event { event_type, handler } => {
                if let Some(wanted) = event_type {
                    if event.event_type() != Some(wanted.as_str()) {
                        return None;
                    }
                }
                Some(Invocation::Event { handler: Arc::clone(handler) })
            }
            Self::Message { pattern, handler } => {
                if !event.is_message() {
                    return None;
                }
                let text = event.text().unwrap_or_default().to_string();
                let captures = match pattern {
                    Some(pattern) => pattern.captures(&text)?,
                    None => MessageCaptures::default(),
                };
                Some(Invocation::Message { handler: Arc::clone(handler), text, captures })
            }
        }
    }
}
