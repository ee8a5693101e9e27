use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::ConnectionRegistry;
use crate::entrypoint::{HandlerError, Invocation};
use crate::event::Event;
use crate::registry::{HandlerRegistry, Registration};

/// Matches inbound events against the registration snapshot and schedules
/// one task per qualifying handler.
///
/// Dispatch never awaits handler completion: a slow or blocked handler
/// stalls only its own task, never the read loop or sibling invocations.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { registry, connections }
    }

    /// Fans one event out to every matching registration for the identity
    /// it was read from. Returns the number of invocations spawned.
    pub fn dispatch(&self, bot_name: &str, event: &Event) -> usize {
        let mut spawned = 0;
        for registration in self.registry.snapshot() {
            if registration.bot_name != bot_name {
                continue;
            }
            let Some(invocation) = registration.entrypoint.bind(event) else {
                continue;
            };
            self.spawn_invocation(registration, event.clone(), invocation);
            spawned += 1;
        }
        spawned
    }

    fn spawn_invocation(
        &self,
        registration: Arc<Registration>,
        event: Event,
        invocation: Invocation,
    ) {
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            match invocation {
                Invocation::Event { handler } => {
                    if let Err(error) = handler.handle(event).await {
                        report_failure(&registration, &error);
                    }
                }
                Invocation::Message { handler, text, captures } => {
                    let channel = event.channel().map(str::to_string);
                    match handler.handle(event, text, captures).await {
                        Err(error) => report_failure(&registration, &error),
                        Ok(reply) => {
                            send_reply(&connections, &registration, channel, reply).await;
                        }
                    }
                }
            }
        });
    }
}

async fn send_reply(
    connections: &ConnectionRegistry,
    registration: &Registration,
    channel: Option<String>,
    reply: Option<String>,
) {
    let Some(reply) = reply.filter(|text| !text.is_empty()) else {
        return;
    };
    let Some(channel) = channel else {
        warn!(bot = %registration.bot_name, "reply skipped: event carries no channel");
        return;
    };
    if let Err(error) =
        connections.send_reply(&registration.bot_name, &channel, &reply).await
    {
        warn!(
            bot = %registration.bot_name,
            channel = %channel,
            error = %error,
            "reply delivery failed"
        );
    }
}

fn report_failure(registration: &Registration, error: &HandlerError) {
    if registration.options.expected_failures.contains(&error.kind) {
        debug!(bot = %registration.bot_name, error = %error, "handler raised an expected failure");
    } else {
        warn!(bot = %registration.bot_name, error = %error, "handler invocation failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use switchboard_core::config::DEFAULT_BOT_NAME;

    use super::Dispatcher;
    use crate::connection::ConnectionRegistry;
    use crate::entrypoint::{
        EventHandler, HandlerError, MessageCaptures, MessageHandler,
    };
    use crate::event::{Event, EVENT_TYPE_MESSAGE};
    use crate::registry::{HandlerRegistry, RegistrationSpec};
    use crate::transport::{NoopRtmTransport, RtmTransport, TransportError};

    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail_sends: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_sends: false }
        }

        fn failing() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_sends: true }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    #[async_trait]
    impl RtmTransport for RecordingTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn read_batch(&self) -> Result<Vec<Event>, TransportError> {
            Ok(Vec::new())
        }

        async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
            if self.fail_sends {
                return Err(TransportError::Send("channel is archived".to_string()));
            }
            self.sent.lock().expect("sent lock").push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Tracker {
        seen: Mutex<Vec<Event>>,
    }

    impl Tracker {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<Event> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl EventHandler for Tracker {
        async fn handle(&self, event: Event) -> Result<(), HandlerError> {
            self.seen.lock().expect("seen lock").push(event);
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(
            &self,
            _event: Event,
            text: String,
            _captures: MessageCaptures,
        ) -> Result<Option<String>, HandlerError> {
            Ok(Some(format!("sure, {text}")))
        }
    }

    struct Silent;

    #[async_trait]
    impl MessageHandler for Silent {
        async fn handle(
            &self,
            _event: Event,
            _text: String,
            _captures: MessageCaptures,
        ) -> Result<Option<String>, HandlerError> {
            Ok(None)
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(
            &self,
            _event: Event,
            _text: String,
            _captures: MessageCaptures,
        ) -> Result<Option<String>, HandlerError> {
            Err(HandlerError::new("Boom", "synthetic failure"))
        }
    }

    fn harness_with(transport: Arc<dyn RtmTransport>) -> (Arc<HandlerRegistry>, Dispatcher) {
        let transports: BTreeMap<String, Arc<dyn RtmTransport>> =
            [(DEFAULT_BOT_NAME.to_string(), transport)].into_iter().collect();
        let connections =
            Arc::new(ConnectionRegistry::with_transports(transports).expect("connections"));
        let registry = Arc::new(HandlerRegistry::new(connections.bot_names()));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), connections);
        (registry, dispatcher)
    }

    fn harness() -> (Arc<HandlerRegistry>, Dispatcher) {
        harness_with(Arc::new(NoopRtmTransport))
    }

    fn message(text: &str) -> Event {
        Event::of_type(EVENT_TYPE_MESSAGE)
            .with("user", "U11")
            .with("text", text)
            .with("channel", "D11")
            .with("ts", "1480798992.000002")
            .with("team", "T11")
    }

    /// Lets spawned invocations run to completion on the current-thread
    /// test scheduler.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn unfiltered_handler_sees_every_event_in_read_order() {
        let (registry, dispatcher) = harness();
        let tracker = Tracker::new();
        registry.register(RegistrationSpec::on_event(tracker.clone())).expect("register");

        let events =
            [Event::of_type("hello"), message("spam ham"), Event::new(), message("ham spam")];
        for event in &events {
            assert_eq!(dispatcher.dispatch(DEFAULT_BOT_NAME, event), 1);
        }
        settle().await;

        assert_eq!(tracker.seen(), events.to_vec());
    }

    #[tokio::test]
    async fn type_filtered_handler_sees_matching_events_only() {
        let (registry, dispatcher) = harness();
        let tracker = Tracker::new();
        registry
            .register(RegistrationSpec::on_event_type("presence_change", tracker.clone()))
            .expect("register");

        let active = Event::of_type("presence_change").with("presence", "active");
        let away = Event::of_type("presence_change").with("presence", "away");
        dispatcher.dispatch(DEFAULT_BOT_NAME, &Event::of_type("hello"));
        dispatcher.dispatch(DEFAULT_BOT_NAME, &active);
        dispatcher.dispatch(DEFAULT_BOT_NAME, &message("spam"));
        dispatcher.dispatch(DEFAULT_BOT_NAME, &away);
        settle().await;

        assert_eq!(tracker.seen(), vec![active, away]);
    }

    #[tokio::test]
    async fn events_outside_the_bot_affinity_are_not_dispatched() {
        let (registry, dispatcher) = harness();
        let tracker = Tracker::new();
        registry.register(RegistrationSpec::on_event(tracker.clone())).expect("register");

        assert_eq!(dispatcher.dispatch("somebody-else", &Event::of_type("hello")), 0);
        settle().await;

        assert!(tracker.seen().is_empty());
    }

    #[tokio::test]
    async fn reply_round_trip_posts_to_the_originating_channel() {
        let transport = Arc::new(RecordingTransport::new());
        let (registry, dispatcher) = harness_with(transport.clone());
        registry
            .register(RegistrationSpec::on_message(Arc::new(Echo)))
            .expect("register");

        dispatcher.dispatch(DEFAULT_BOT_NAME, &message("spam ham"));
        settle().await;

        assert_eq!(transport.sent(), vec![("D11".to_string(), "sure, spam ham".to_string())]);
    }

    #[tokio::test]
    async fn empty_reply_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let (registry, dispatcher) = harness_with(transport.clone());
        registry
            .register(RegistrationSpec::on_message(Arc::new(Silent)))
            .expect("register");

        dispatcher.dispatch(DEFAULT_BOT_NAME, &message("spam ham"));
        settle().await;

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_handler_suppresses_its_reply_and_spares_siblings() {
        let transport = Arc::new(RecordingTransport::new());
        let (registry, dispatcher) = harness_with(transport.clone());
        registry
            .register(RegistrationSpec::on_message(Arc::new(Failing)).expect_failure("Boom"))
            .expect("register failing");
        registry
            .register(RegistrationSpec::on_message(Arc::new(Echo)))
            .expect("register echo");

        assert_eq!(dispatcher.dispatch(DEFAULT_BOT_NAME, &message("spam ham")), 2);
        settle().await;

        assert_eq!(transport.sent(), vec![("D11".to_string(), "sure, spam ham".to_string())]);
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_not_fatal() {
        let transport = Arc::new(RecordingTransport::failing());
        let (registry, dispatcher) = harness_with(transport);
        registry
            .register(RegistrationSpec::on_message(Arc::new(Echo)))
            .expect("register");

        dispatcher.dispatch(DEFAULT_BOT_NAME, &message("first"));
        settle().await;

        // The loop keeps dispatching after a failed send.
        assert_eq!(dispatcher.dispatch(DEFAULT_BOT_NAME, &message("second")), 1);
        settle().await;
    }

    struct Gated {
        started: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl EventHandler for Gated {
        async fn handle(&self, _event: Event) -> Result<(), HandlerError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn blocked_handler_never_delays_its_sibling() {
        let (registry, dispatcher) = harness();

        let started = Arc::new(AtomicUsize::new(0));
        let slow_completed = Arc::new(AtomicUsize::new(0));
        let fast_completed = Arc::new(AtomicUsize::new(0));
        let slow_gate = Arc::new(Notify::new());
        let fast_gate = Arc::new(Notify::new());

        registry
            .register(RegistrationSpec::on_event(Arc::new(Gated {
                started: started.clone(),
                completed: slow_completed.clone(),
                gate: slow_gate.clone(),
            })))
            .expect("register slow");
        registry
            .register(RegistrationSpec::on_event(Arc::new(Gated {
                started: started.clone(),
                completed: fast_completed.clone(),
                gate: fast_gate.clone(),
            })))
            .expect("register fast");

        assert_eq!(dispatcher.dispatch(DEFAULT_BOT_NAME, &Event::of_type("hello")), 2);
        settle().await;

        // Both invocations are in flight before either completes.
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(slow_completed.load(Ordering::SeqCst), 0);
        assert_eq!(fast_completed.load(Ordering::SeqCst), 0);

        fast_gate.notify_one();
        settle().await;

        assert_eq!(fast_completed.load(Ordering::SeqCst), 1);
        assert_eq!(slow_completed.load(Ordering::SeqCst), 0, "blocked sibling stays blocked");

        slow_gate.notify_one();
        settle().await;

        assert_eq!(slow_completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_added_mid_pass_is_not_retroactively_invoked() {
        let (registry, dispatcher) = harness();
        let early = Tracker::new();
        let late = Tracker::new();

        registry.register(RegistrationSpec::on_event(early.clone())).expect("register early");
        dispatcher.dispatch(DEFAULT_BOT_NAME, &Event::of_type("hello"));

        registry.register(RegistrationSpec::on_event(late.clone())).expect("register late");
        dispatcher.dispatch(DEFAULT_BOT_NAME, &Event::of_type("goodbye"));
        settle().await;

        assert_eq!(early.seen().len(), 2);
        assert_eq!(late.seen(), vec![Event::of_type("goodbye")]);
    }
}
