//! MQTT broker publisher

use super::{Message, PublishError, Publisher};
use crate::config::MqttConfig;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Split a broker address into host and port
pub fn parse_broker(broker: &str) -> Result<(String, u16), PublishError> {
    let trimmed = broker.trim();
    let address = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| PublishError::InvalidBroker(broker.to_string()))?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };

    if host.is_empty() || port == 0 {
        return Err(PublishError::InvalidBroker(broker.to_string()));
    }
    Ok((host.to_string(), port))
}

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Publishes to an MQTT broker.
///
/// A background thread drives the connection and reconnects after errors.
/// `publish` only queues the request with the client.
pub struct MqttPublisher {
    client: Client,
    stopping: Arc<AtomicBool>,
}

impl MqttPublisher {
    pub fn connect(config: &MqttConfig) -> Result<Self, PublishError> {
        let (host, port) = parse_broker(&config.broker)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host.clone(), port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let stopping = Arc::new(AtomicBool::new(false));

        let stop = stopping.clone();
        thread::Builder::new()
            .name("keypulse-mqtt".to_string())
            .spawn(move || {
                for notification in connection.iter() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            log::info!("connected to MQTT broker {}:{}", host, port);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("MQTT connection error: {}", e);
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                log::debug!("MQTT connection thread stopped");
            })?;

        Ok(Self { client, stopping })
    }

    /// Ask the broker to close the session. Queued requests ahead of the
    /// disconnect are still sent.
    pub fn disconnect(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            log::debug!("MQTT disconnect: {}", e);
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, message: &Message) -> Result<(), PublishError> {
        self.client.try_publish(
            message.topic.as_str(),
            qos(message.qos),
            message.retained,
            message.payload.as_bytes().to_vec(),
        )?;
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
