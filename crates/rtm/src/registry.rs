use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use switchboard_core::config::DEFAULT_BOT_NAME;

use crate::connection::SetupError;
use crate::entrypoint::{Entrypoint, EventHandler, MessageHandler, MessagePattern};

/// Standard worker-invocation options forwarded unchanged to the failure
/// reporting channel; opaque to matching and dispatch.
#[derive(Clone, Debug, Default)]
pub struct WorkerOptions {
    /// Failure kinds considered part of normal operation; reported at debug
    /// severity instead of warn.
    pub expected_failures: BTreeSet<String>,
    /// Argument names whose values must never be echoed into logs.
    pub sensitive_arguments: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// One registered handler descriptor. Several registrations may share the
/// same underlying handler (pattern stacking); each is evaluated
/// independently at dispatch time.
pub struct Registration {
    pub id: RegistrationId,
    pub bot_name: String,
    pub options: WorkerOptions,
    pub entrypoint: Entrypoint,
}

enum SpecKind {
    Event { event_type: Option<String>, handler: Arc<dyn EventHandler> },
    Message { pattern: Option<String>, handler: Arc<dyn MessageHandler> },
}

/// Builder-style descriptor a service hands to [`HandlerRegistry::register`].
pub struct RegistrationSpec {
    bot_name: Option<String>,
    options: WorkerOptions,
    kind: SpecKind,
}

impl RegistrationSpec {
    pub fn on_event(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            bot_name: None,
            options: WorkerOptions::default(),
            kind: SpecKind::Event { event_type: None, handler },
        }
    }

    pub fn on_event_type(event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            bot_name: None,
            options: WorkerOptions::default(),
            kind: SpecKind::Event { event_type: Some(event_type.into()), handler },
        }
    }

    pub fn on_message(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            bot_name: None,
            options: WorkerOptions::default(),
            kind: SpecKind::Message { pattern: None, handler },
        }
    }

    pub fn on_message_pattern(
        pattern: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            bot_name: None,
            options: WorkerOptions::default(),
            kind: SpecKind::Message { pattern: Some(pattern.into()), handler },
        }
    }

    /// Binds the registration to a named bot identity instead of the
    /// default one.
    pub fn bot(mut self, bot_name: impl Into<String>) -> Self {
        self.bot_name = Some(bot_name.into());
        self
    }

    pub fn expect_failure(mut self, kind: impl Into<String>) -> Self {
        self.options.expected_failures.insert(kind.into());
        self
    }

    pub fn redact(mut self, argument: impl Into<String>) -> Self {
        self.options.sensitive_arguments.insert(argument.into());
        self
    }
}

/// Thread-safe set of handler registrations.
///
/// Membership changes only at service startup and shutdown, but dispatch
/// may be iterating concurrently: iteration always works over a
/// point-in-time snapshot, so a registration added mid-pass is not
/// retroactively invoked and removal never tears a running pass.
pub struct HandlerRegistry {
    known_bots: BTreeSet<String>,
    entries: RwLock<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new(known_bots: BTreeSet<String>) -> Self {
        Self { known_bots, entries: RwLock::new(Vec::new()), next_id: AtomicU64::new(0) }
    }

    /// Validates and adds a registration. Bot affinity must name a
    /// configured identity, and message patterns are compiled here so a bad
    /// pattern aborts startup rather than surfacing at dispatch time.
    pub fn register(&self, spec: RegistrationSpec) -> Result<RegistrationId, SetupError> {
        let bot_name = spec.bot_name.unwrap_or_else(|| DEFAULT_BOT_NAME.to_string());
        if !self.known_bots.contains(&bot_name) {
            return Err(SetupError::UnknownBot { bot: bot_name });
        }

        let entrypoint = match spec.kind {
            SpecKind::Event { event_type, handler } => Entrypoint::Event { event_type, handler },
            SpecKind::Message { pattern, handler } => {
                let pattern =
                    pattern.as_deref().map(MessagePattern::compile).transpose()?;
                Entrypoint::Message { pattern, handler }
            }
        };

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration =
            Arc::new(Registration { id, bot_name, options: spec.options, entrypoint });
        self.write_entries().push(registration);
        Ok(id)
    }

    /// Removes a registration. Safe while dispatch iterates a snapshot, and
    /// a no-op for unknown ids.
    pub fn unregister(&self, id: RegistrationId) {
        self.write_entries().retain(|registration| registration.id != id);
    }

    /// Point-in-time copy of the membership for one dispatch pass.
    pub fn snapshot(&self) -> Vec<Arc<Registration>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Registration>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
