mod settings;

use std::path::Path;

use crate::config::settings::PartialSettings;
use crate::utils::{Error, Result};
use config::{Config, Environment, File};

pub use settings::{
    Announcement, BoundTask, LogSettings, MqttSettings, OrderedMap, ScheduleTable, Settings,
    TaskBinding, TaskItem, TopicSettings,
};

/// Default configuration file, looked up relative to the working directory
/// with any supported extension (`config/default.toml`, ...).
pub const DEFAULT_CONFIG: &str = "config/default";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings> {
    load_config_from(None)
}

/// Loads the configuration from `path` (required when given, optional
/// default file otherwise) and `PSMQTT_*` environment variables, where `__`
/// separates nested keys (`PSMQTT_MQTT__BROKER`).
/// Merges the configuration with default values.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG).required(false),
    };
    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix("PSMQTT")
            .prefix_separator("_")
            .separator("__"),
    );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = merge(partial, Settings::default());
    validate(&settings)?;
    Ok(settings)
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let mqtt = partial.mqtt;
    let topics = partial.topics;

    Settings {
        mqtt: match mqtt {
            Some(m) => MqttSettings {
                broker: m.broker.unwrap_or(default.mqtt.broker),
                port: m.port.unwrap_or(default.mqtt.port),
                client_id: m.client_id.unwrap_or(default.mqtt.client_id),
                clean_session: m.clean_session.unwrap_or(default.mqtt.clean_session),
                keep_alive_secs: m.keep_alive_secs.unwrap_or(default.mqtt.keep_alive_secs),
                username: m.username.or(default.mqtt.username),
                password: m.password.or(default.mqtt.password),
                qos: m.qos.unwrap_or(default.mqtt.qos),
                retain: m.retain.unwrap_or(default.mqtt.retain),
                reconnect_delay_secs: m
                    .reconnect_delay_secs
                    .unwrap_or(default.mqtt.reconnect_delay_secs),
                birth: match m.birth {
                    Some(b) => b.merge(default.mqtt.birth),
                    None => default.mqtt.birth,
                },
                will: match m.will {
                    Some(w) => w.merge(default.mqtt.will),
                    None => default.mqtt.will,
                },
            },
            None => default.mqtt,
        },
        topics: TopicSettings {
            prefix: topics
                .as_ref()
                .and_then(|t| t.prefix.clone())
                .unwrap_or(default.topics.prefix),
            request: topics
                .as_ref()
                .and_then(|t| t.request.clone())
                .unwrap_or(default.topics.request),
        },
        log: LogSettings {
            level: partial
                .log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
        schedule: partial.schedule.unwrap_or(default.schedule),
    }
}

fn validate(settings: &Settings) -> Result<()> {
    let levels = [
        ("mqtt.qos", settings.mqtt.qos),
        ("mqtt.birth.qos", settings.mqtt.birth.qos),
        ("mqtt.will.qos", settings.mqtt.will.qos),
    ];
    for (key, qos) in levels {
        if qos > 2 {
            return Err(Error::InvalidConfig(format!(
                "{key} must be 0, 1 or 2, got {qos}"
            )));
        }
    }
    Ok(())
}
