//! Action sinks
//!
//! A sink receives actions from the classifier. [`PulseSink`] renders each
//! "on" action as a published `ON` state followed, after a fixed per-kind
//! delay, by `OFF`, and announces discovery metadata the first time a key
//! is seen.

pub mod mqtt;
pub mod publisher;
pub mod topic;

pub use mqtt::{parse_broker, MqttPublisher};
pub use publisher::{
    JsonLinesPublisher, MemoryPublisher, Message, PublishError, PublishQueue, Publisher,
};
pub use topic::{sanitize_key_name, DiscoveryPayload, TopicBuilder};

use crate::classifier::{Action, ActionKind, Phase};
use crate::keyboard::KeyId;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Receives classified actions.
///
/// Implementations are called while the classifier holds the key's lock,
/// so they must return quickly and never call back into the classifier.
/// [`PulseSink`] stays quick when its publisher is a [`PublishQueue`].
pub trait ActionSink: Send + Sync {
    /// Called once, the first time the classifier creates state for `key`
    fn key_seen(&self, _key: &KeyId) {}

    /// Deliver an action
    fn emit(&self, action: Action);
}

impl ActionSink for mpsc::Sender<Action> {
    fn emit(&self, action: Action) {
        let _ = self.send(action);
    }
}

/// How long each kind of pulse stays on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTimings {
    pub single: Duration,
    pub double: Duration,
    pub long: Duration,
}

impl PulseTimings {
    pub fn off_delay(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Single => self.single,
            ActionKind::Double => self.double,
            ActionKind::Long => self.long,
        }
    }
}

impl Default for PulseTimings {
    fn default() -> Self {
        Self {
            single: Duration::from_millis(150),
            double: Duration::from_millis(200),
            long: Duration::from_millis(200),
        }
    }
}

/// Publishes actions as ON/OFF pulses on per-key topics
pub struct PulseSink {
    topics: TopicBuilder,
    timings: PulseTimings,
    publisher: Arc<dyn Publisher>,
    scheduler: Arc<dyn Scheduler>,
    observer: Option<mpsc::Sender<Action>>,
    registered: Mutex<HashSet<KeyId>>,
}

impl PulseSink {
    pub fn new(
        topics: TopicBuilder,
        timings: PulseTimings,
        publisher: Arc<dyn Publisher>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            topics,
            timings,
            publisher,
            scheduler,
            observer: None,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Also forward every on and off edge to `observer`
    pub fn with_observer(mut self, observer: mpsc::Sender<Action>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    /// Announce the three sensors for `key`, once per key
    fn register(&self, key: &KeyId) {
        if !self.registered.lock().insert(key.clone()) {
            return;
        }

        for &kind in ActionKind::all() {
            let payload = self.topics.discovery_payload(key, kind);
            match serde_json::to_string(&payload) {
                Ok(json) => {
                    let message = Message::retained(self.topics.discovery_topic(key, kind), json);
                    publish_logged(self.publisher.as_ref(), &message);
                }
                Err(e) => log::warn!("could not encode discovery for {}: {}", key, e),
            }
        }
        log::debug!("registered sensors for {}", key);
    }
}

fn publish_logged(publisher: &dyn Publisher, message: &Message) {
    if let Err(e) = publisher.publish(message) {
        log::warn!("publish to {} failed: {}", message.topic, e);
    }
}

fn notify(observer: &Option<mpsc::Sender<Action>>, action: Action) {
    if let Some(observer) = observer {
        let _ = observer.send(action);
    }
}

impl ActionSink for PulseSink {
    fn key_seen(&self, key: &KeyId) {
        self.register(key);
    }

    fn emit(&self, action: Action) {
        let topic = self.topics.state_topic(&action.key, action.kind);

        if action.phase == Phase::Off {
            publish_logged(self.publisher.as_ref(), &Message::state(topic, Phase::Off.payload()));
            notify(&self.observer, action);
            return;
        }

        self.register(&action.key);
        publish_logged(
            self.publisher.as_ref(),
            &Message::state(topic.clone(), Phase::On.payload()),
        );

        notify(&self.observer, action.clone());

        let publisher = self.publisher.clone();
        let observer = self.observer.clone();
        let off_at = action.time + self.timings.off_delay(action.kind);
        self.scheduler.schedule_at(
            off_at,
            Box::new(move |fired_at| {
                publish_logged(publisher.as_ref(), &Message::state(topic, Phase::Off.payload()));
                notify(&observer, action.to_off(fired_at));
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    struct FailingPublisher;

    impl Publisher for FailingPublisher {
        fn publish(&self, _message: &Message) -> Result<(), PublishError> {
            Err(PublishError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "gone",
            )))
        }
    }

    fn setup() -> (Arc<ManualScheduler>, Arc<MemoryPublisher>, PulseSink) {
        let scheduler = Arc::new(ManualScheduler::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let sink = PulseSink::new(
            TopicBuilder::new("homeassistant", "kb"),
            PulseTimings::default(),
            publisher.clone(),
            scheduler.clone(),
        );
        (scheduler, publisher, sink)
    }

    #[test]
    fn key_seen_announces_three_sensors_once() {
        let (_scheduler, publisher, sink) = setup();
        let key = KeyId::from("A");

        sink.key_seen(&key);
        sink.key_seen(&key);

        let messages = publisher.messages();
        let topics: Vec<&str> = messages.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "homeassistant/binary_sensor/kb_a/config",
                "homeassistant/binary_sensor/kb_a_double/config",
                "homeassistant/binary_sensor/kb_a_long/config",
            ]
        );
        assert!(messages.iter().all(|m| m.retained && m.qos == 1));

        let payload: DiscoveryPayload =
            serde_json::from_str(&messages[2].payload).expect("discovery json");
        assert_eq!(payload.name, "A (Long Press)");
    }

    #[test]
    fn single_pulse_turns_off_after_150ms() {
        let (scheduler, publisher, sink) = setup();
        let key = KeyId::from("A");
        sink.key_seen(&key);
        publisher.take();

        sink.emit(Action::on(key, ActionKind::Single, scheduler.at_ms(300)));
        let topic = "homeassistant/binary_sensor/kb_a/state";
        assert_eq!(publisher.on_topic(topic).len(), 1);

        scheduler.advance_to(scheduler.at_ms(449));
        assert_eq!(publisher.on_topic(topic).len(), 1);

        scheduler.advance_to(scheduler.at_ms(450));
        let payloads: Vec<String> = publisher.on_topic(topic).into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["ON", "OFF"]);
    }

    #[test]
    fn double_and_long_pulses_last_200ms() {
        let (scheduler, publisher, sink) = setup();
        let key = KeyId::from("B");

        sink.emit(Action::on(key.clone(), ActionKind::Double, scheduler.at_ms(0)));
        sink.emit(Action::on(key, ActionKind::Long, scheduler.at_ms(0)));

        scheduler.advance_to(scheduler.at_ms(199));
        assert!(publisher.messages().iter().all(|m| m.payload != "OFF"));

        scheduler.advance_to(scheduler.at_ms(200));
        let offs = publisher
            .messages()
            .into_iter()
            .filter(|m| m.payload == "OFF")
            .count();
        assert_eq!(offs, 2);
    }

    #[test]
    fn emit_registers_unseen_key() {
        let (scheduler, publisher, sink) = setup();
        sink.emit(Action::on(KeyId::from("C"), ActionKind::Single, scheduler.at_ms(0)));

        let configs = publisher
            .messages()
            .into_iter()
            .filter(|m| m.topic.ends_with("/config"))
            .count();
        assert_eq!(configs, 3);
    }

    #[test]
    fn observer_sees_on_then_off() {
        let (scheduler, _publisher, sink) = setup();
        let (tx, rx) = mpsc::channel();
        let sink = sink.with_observer(tx);

        sink.emit(Action::on(KeyId::from("A"), ActionKind::Long, scheduler.at_ms(500)));
        scheduler.advance_to(scheduler.at_ms(1000));

        let seen: Vec<Action> = rx.try_iter().collect();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].phase, Phase::On);
        assert_eq!(seen[1].phase, Phase::Off);
        assert_eq!(seen[1].kind, ActionKind::Long);
        assert_eq!(seen[1].time, scheduler.at_ms(700));
    }

    #[test]
    fn publish_failure_does_not_panic() {
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = PulseSink::new(
            TopicBuilder::new("homeassistant", "kb"),
            PulseTimings::default(),
            Arc::new(FailingPublisher),
            scheduler.clone(),
        );

        sink.emit(Action::on(KeyId::from("A"), ActionKind::Single, scheduler.at_ms(0)));
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(scheduler.pending(), 0);
    }
}
