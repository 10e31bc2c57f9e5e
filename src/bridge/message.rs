/// A single outbound publish handed to the broker collaborator.
///
/// # Fields
///
/// - `topic` - Fully expanded topic, prefix included.
/// - `payload` - UTF-8 text produced by the payload encoder or an error message.
/// - `qos` - MQTT quality of service level (0, 1 or 2).
/// - `retain` - Whether the broker keeps the message as the topic's last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

/// Outbound side of the broker connection.
///
/// Publishing is fire-and-forget: implementations queue the request and
/// report delivery problems through logging only.
pub trait Publisher: Send + Sync {
    fn publish(&self, request: PublishRequest);
}
