use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, Transport};
use tracing::{debug, error, info, warn};

use crate::bridge::{Dispatcher, PublishRequest, Publisher};
use crate::config::{Announcement, MqttSettings};

/// Port on which the broker is expected to speak TLS.
pub const SECURE_PORT: u16 = 8883;

/// Number of outgoing requests the client buffers while the event loop is
/// busy or disconnected.
pub const REQUEST_CAPACITY: usize = 1000;

pub fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Builds client options: credentials, last will, and TLS on the secure port.
pub fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
    options
        .set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(1)))
        .set_clean_session(settings.clean_session)
        .set_last_will(last_will(&settings.will));

    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.as_deref().unwrap_or_default());
    }
    if settings.port == SECURE_PORT {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

fn last_will(will: &Announcement) -> LastWill {
    LastWill::new(&will.topic, will.payload.as_bytes(), qos(will.qos), will.retain)
}

/// Creates the client handle and the event loop that drives it.
pub fn connect(settings: &MqttSettings) -> (AsyncClient, EventLoop) {
    AsyncClient::new(mqtt_options(settings), REQUEST_CAPACITY)
}

/// [`Publisher`] that queues publishes on an MQTT client.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, request: PublishRequest) {
        let topic = request.topic;
        if let Err(e) =
            self.client
                .try_publish(&topic, qos(request.qos), request.retain, request.payload)
        {
            warn!("Failed to queue publish to {}: {}", topic, e);
        }
    }
}

/// Returns the task addressed by a request topic, or `None` when the topic
/// is outside the request root.
pub fn request_task<'a>(request_root: &str, topic: &'a str) -> Option<&'a str> {
    topic.strip_prefix(request_root)
}

/// Handles connection events for the bridge.
pub struct RequestRouter {
    client: AsyncClient,
    settings: MqttSettings,
    request_root: Option<String>,
    dispatcher: Arc<Dispatcher>,
}

impl RequestRouter {
    pub fn new(
        client: AsyncClient,
        settings: MqttSettings,
        request_root: Option<String>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            client,
            settings,
            request_root,
            dispatcher,
        }
    }

    /// Announces the bridge and subscribes to requests.
    pub fn on_connect(&self) {
        let birth = &self.settings.birth;
        if let Err(e) = self.client.try_publish(
            &birth.topic,
            qos(birth.qos),
            birth.retain,
            birth.payload.as_bytes(),
        ) {
            warn!("Failed to publish birth message: {}", e);
        }

        if let Some(root) = &self.request_root {
            let pattern = format!("{root}#");
            debug!("Connected to MQTT broker, subscribing to topic {}", pattern);
            if let Err(e) = self.client.try_subscribe(&pattern, qos(self.settings.qos)) {
                error!("Failed to subscribe to {}: {}", pattern, e);
            }
        }
    }

    /// Dispatches the task named by an inbound request topic. Runs on the
    /// blocking pool since handlers may sample the system synchronously.
    pub async fn on_message(&self, topic: &str) {
        let task = match &self.request_root {
            Some(root) => request_task(root, topic),
            None => None,
        };
        let Some(task) = task else {
            warn!("Unknown topic: {}", topic);
            return;
        };

        let task = task.to_string();
        let dispatcher = Arc::clone(&self.dispatcher);
        if let Err(e) =
            tokio::task::spawn_blocking(move || dispatcher.dispatch(&task, &task)).await
        {
            error!("Request {} failed: {}", topic, e);
        }
    }

    /// Fixed pause after the connection dropped.
    pub async fn on_disconnect(&self) {
        tokio::time::sleep(Duration::from_secs(self.settings.reconnect_delay_secs)).await;
    }
}

/// Polls the event loop forever. Connection errors are logged and retried
/// after the configured backoff; they never reach the dispatcher.
pub async fn run_event_loop(mut eventloop: EventLoop, router: RequestRouter) {
    info!(
        "Connecting to MQTT broker {}:{}",
        router.settings.broker, router.settings.port
    );

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                router.on_connect();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "{} {:?} {}",
                    publish.topic,
                    publish.qos,
                    String::from_utf8_lossy(&publish.payload)
                );
                router.on_message(&publish.topic).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Connection to MQTT broker lost: {}. Retrying in {}s",
                    e, router.settings.reconnect_delay_secs
                );
                router.on_disconnect().await;
            }
        }
    }
}
