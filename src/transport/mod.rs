//! The `transport` module is responsible for the connection to the MQTT
//! broker.
//!
//! It builds client options (credentials, last will, TLS), publishes values
//! on behalf of the dispatcher, announces the bridge on connect, turns
//! inbound request topics into task dispatches and pauses before retrying
//! when the connection drops.

pub mod mqtt;

pub use mqtt::{MqttPublisher, RequestRouter, connect, mqtt_options, request_task, run_event_loop};

#[cfg(test)]
mod tests;
