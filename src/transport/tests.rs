use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, QoS, Transport};

use super::mqtt::{MqttPublisher, RequestRouter, SECURE_PORT, mqtt_options, qos, request_task};
use crate::bridge::tests::test_dispatcher;
use crate::bridge::{PublishRequest, Publisher};
use crate::config::Settings;

#[test]
fn test_request_task() {
    let root = "psmqtt/box/request/";
    assert_eq!(request_task(root, "psmqtt/box/request/cpu_percent"), Some("cpu_percent"));
    assert_eq!(
        request_task(root, "psmqtt/box/request/virtual_memory/*"),
        Some("virtual_memory/*")
    );
    assert_eq!(request_task(root, "psmqtt/box/cpu_percent"), None);
}

#[test]
fn test_qos_levels() {
    assert_eq!(qos(0), QoS::AtMostOnce);
    assert_eq!(qos(1), QoS::AtLeastOnce);
    assert_eq!(qos(2), QoS::ExactlyOnce);
}

#[test]
fn test_mqtt_options_plain() {
    let mut settings = Settings::default().mqtt;
    settings.broker = "broker.local".to_string();
    settings.client_id = "psmqtt-test".to_string();
    settings.keep_alive_secs = 30;
    settings.clean_session = true;

    let options = mqtt_options(&settings);
    assert_eq!(options.broker_address(), ("broker.local".to_string(), 1883));
    assert_eq!(options.client_id(), "psmqtt-test");
    assert_eq!(options.keep_alive(), Duration::from_secs(30));
    assert!(options.clean_session());
    assert!(matches!(options.transport(), Transport::Tcp));

    assert!(options.last_will().is_some());
}

#[test]
fn test_mqtt_options_secure_port_enables_tls() {
    let mut settings = Settings::default().mqtt;
    settings.port = SECURE_PORT;

    let options = mqtt_options(&settings);
    assert!(matches!(options.transport(), Transport::Tls(_)));
}

#[tokio::test]
async fn test_publisher_queues_requests() {
    let settings = Settings::default().mqtt;
    let (client, _eventloop) = AsyncClient::new(mqtt_options(&settings), 10);
    let publisher = MqttPublisher::new(client);

    // queued without a connection; must not panic or block
    publisher.publish(PublishRequest {
        topic: "psmqtt/box/uptime".to_string(),
        payload: "42".to_string(),
        qos: 0,
        retain: false,
    });
}

#[tokio::test]
async fn test_router_dispatches_requests() {
    let (dispatcher, publisher) = test_dispatcher();
    let settings = Settings::default().mqtt;
    let (client, _eventloop) = AsyncClient::new(mqtt_options(&settings), 10);
    let router = RequestRouter::new(
        client,
        settings,
        Some("psmqtt/host/request/".to_string()),
        Arc::new(dispatcher),
    );

    router.on_message("psmqtt/host/request/cpu_percent").await;
    router.on_message("psmqtt/host/other/cpu_percent").await;

    assert_eq!(publisher.topics(), vec!["psmqtt/host/cpu_percent"]);
}
