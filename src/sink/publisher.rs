//! Transport seam for published messages
//!
//! The sink hands fully formed messages to a [`Publisher`]. Messages go to
//! an MQTT broker ([`super::MqttPublisher`]) or to a JSON-lines stream.
//! [`PublishQueue`] moves delivery onto its own thread so callers never
//! wait on I/O.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

/// Error type for publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Invalid broker address: {0}")]
    InvalidBroker(String),

    #[error("Publish queue is closed")]
    Closed,
}

/// A message bound for a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retained: bool,
}

impl Message {
    /// Transient state update (QoS 0, not retained)
    pub fn state(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retained: false,
        }
    }

    /// Retained announcement (QoS 1)
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 1,
            retained: true,
        }
    }
}

/// Delivers messages somewhere
pub trait Publisher: Send + Sync {
    fn publish(&self, message: &Message) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct Line<'a> {
    time: String,
    #[serde(flatten)]
    message: &'a Message,
}

/// Writes one JSON object per message to a writer
pub struct JsonLinesPublisher {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesPublisher {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Create (or truncate) `path` and write to it
    pub fn create(path: &Path) -> Result<Self, PublishError> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }
}

impl Publisher for JsonLinesPublisher {
    fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let line = Line {
            time: chrono::Utc::now().to_rfc3339(),
            message,
        };
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, &line)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Hands messages to a worker thread that feeds the wrapped publisher.
///
/// `publish` only enqueues. Delivery failures are logged by the worker.
pub struct PublishQueue {
    tx: Mutex<Option<mpsc::Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PublishQueue {
    pub fn spawn(inner: Arc<dyn Publisher>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Message>();
        let worker = thread::Builder::new()
            .name("keypulse-publish".to_string())
            .spawn(move || {
                for message in rx {
                    if let Err(e) = inner.publish(&message) {
                        log::warn!("failed to publish to {}: {}", message.topic, e);
                    }
                }
                log::debug!("publish queue drained");
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting messages, deliver what is queued and join the worker.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Publisher for PublishQueue {
    fn publish(&self, message: &Message) -> Result<(), PublishError> {
        match &*self.tx.lock() {
            Some(tx) => tx.send(message.clone()).map_err(|_| PublishError::Closed),
            None => Err(PublishError::Closed),
        }
    }
}

impl Drop for PublishQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps published messages in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<Message>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Messages published to `topic`, in order
    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Remove and return everything published so far
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, message: &Message) -> Result<(), PublishError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}
