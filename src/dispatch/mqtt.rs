use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, ClientError, Event, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::EventSink;
use crate::config::MqttSettings;
use crate::event::FallEvent;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_QUEUE_CAP: usize = 10;

/// Publishes the JSON record (QoS 1) to `<prefix>/<device_id>/fall`.
///
/// `deliver` only queues the publish on the client. It never blocks: when the
/// broker is unreachable the request queue fills and further events fail.
pub struct MqttSink {
    client: Client,
    topic_prefix: String,
    closing: Arc<AtomicBool>,
    _connection: JoinHandle<()>,
}

impl MqttSink {
    /// Create the client and start the connection driver thread.
    ///
    /// The broker is contacted lazily by the driver; an unreachable broker is
    /// logged there and retried, and publishes queue until the client's
    /// request buffer fills.
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);

        let (client, mut connection) = Client::new(options, REQUEST_QUEUE_CAP);
        let closing = Arc::new(AtomicBool::new(false));
        let driver_closing = Arc::clone(&closing);
        let driver = std::thread::Builder::new()
            .name("mqtt-connection".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    if driver_closing.load(Ordering::SeqCst) {
                        break;
                    }
                    match event {
                        Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                        Err(e) => {
                            log::warn!("MQTT connection error: {}", e);
                            std::thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn MQTT connection thread: {}", e))?;

        log::info!(
            "MQTT sink configured for {}:{} (prefix {})",
            settings.host,
            settings.port,
            settings.topic_prefix
        );
        Ok(Self {
            client,
            topic_prefix: settings.topic_prefix.trim_end_matches('/').to_string(),
            closing,
            _connection: driver,
        })
    }

    pub fn topic_for(&self, event: &FallEvent) -> String {
        fall_topic(&self.topic_prefix, event.device_id())
    }
}

impl EventSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn acknowledges(&self) -> bool {
        false
    }

    fn deliver(&self, event: &FallEvent) -> Result<()> {
        let payload = event.to_json()?;
        self.client
            .try_publish(
                self.topic_for(event),
                QoS::AtLeastOnce,
                false,
                payload.into_bytes(),
            )
            .map_err(|e| match e {
                ClientError::TryRequest(_) => {
                    anyhow!("MQTT request queue full (broker unreachable?)")
                }
                other => anyhow!("MQTT publish failed: {}", other),
            })
    }

    fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.try_disconnect() {
            log::debug!("MQTT disconnect not queued: {}", e);
        }
    }
}

fn fall_topic(prefix: &str, device_id: &str) -> String {
    format!("{}/{}/fall", prefix, device_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::EventIdentity;
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn topic_includes_device() {
        assert_eq!(fall_topic("guardian", "gd001"), "guardian/gd001/fall");
    }

    #[test]
    fn unreachable_broker_fails_fast_once_queue_is_full() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .expect("bind loopback")
            .local_addr()
            .expect("local addr")
            .port();
        let sink = MqttSink::connect(&MqttSettings {
            host: "127.0.0.1".to_string(),
            port,
            topic_prefix: "guardian/".to_string(),
            client_id: "guardian_test".to_string(),
        })
        .expect("client");
        assert!(!sink.acknowledges());

        let event = FallEvent::confirm(&EventIdentity::new("gd001", "lab"));
        assert_eq!(sink.topic_for(&event), "guardian/gd001/fall");

        let started = Instant::now();
        let errors: Vec<String> = (0..REQUEST_QUEUE_CAP * 3)
            .filter_map(|_| sink.deliver(&event).err())
            .map(|e| e.to_string())
            .collect();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(errors.len() >= REQUEST_QUEUE_CAP);
        assert!(errors.iter().all(|e| e.contains("queue full")));

        sink.close();
    }
}
