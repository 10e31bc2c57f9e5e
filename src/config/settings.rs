use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// Top-level configuration settings for the application.
///
/// Includes the broker connection, the topic layout, logging and the
/// schedule of periodic tasks.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub topics: TopicSettings,
    pub log: LogSettings,
    pub schedule: ScheduleTable,
}

/// Configuration settings for the MQTT connection.
#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// QoS used for every value publish.
    pub qos: u8,
    pub retain: bool,
    /// Pause after a connection error before polling the broker again.
    pub reconnect_delay_secs: u64,
    pub birth: Announcement,
    pub will: Announcement,
}

/// A fixed message published on connect (birth) or by the broker on an
/// unexpected disconnect (last will).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

/// Topic layout.
///
/// Every value topic starts with `prefix`; requests arrive under
/// `<prefix><request>/`. An empty `request` disables requests.
#[derive(Debug, Deserialize, Clone)]
pub struct TopicSettings {
    pub prefix: String,
    pub request: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Schedule section: one mapping, or a list of mappings, from recurrence
/// expression to the tasks it triggers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScheduleTable {
    Single(OrderedMap<TaskBinding>),
    Many(Vec<OrderedMap<TaskBinding>>),
}

/// Tasks bound to one recurrence expression.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TaskBinding {
    /// `"every 5 minutes" = "cpu_percent"`
    Task(String),
    /// `"every 5 minutes" = ["cpu_percent", { "virtual_memory/*" = "mem/*" }]`
    List(Vec<TaskItem>),
    /// `"every 5 minutes" = { "cpu_percent" = "sensors/cpu" }`
    Topics(OrderedMap<String>),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TaskItem {
    Task(String),
    Topics(OrderedMap<String>),
}

/// String-keyed map that keeps the order keys appear in the configuration,
/// so tasks bound to one schedule run in the order they were written.
/// A repeated key replaces the earlier value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, key: String, value: V) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (key, value) in iter {
            map.insert(key.into(), value);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// A task together with the topic it publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundTask {
    pub task: String,
    pub topic: Option<String>,
}

impl BoundTask {
    pub fn new(task: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            task: task.into(),
            topic,
        }
    }

    /// The explicit topic if one was configured, otherwise the task itself.
    pub fn topic_source(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.task)
    }
}

impl ScheduleTable {
    /// Flattens the table into `(expression, binding)` pairs.
    pub fn entries(&self) -> Vec<(&str, &TaskBinding)> {
        match self {
            ScheduleTable::Single(map) => map.iter().collect(),
            ScheduleTable::Many(maps) => maps.iter().flat_map(|map| map.iter()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for ScheduleTable {
    fn default() -> Self {
        ScheduleTable::Single(OrderedMap::default())
    }
}

impl TaskBinding {
    pub fn tasks(&self) -> Vec<BoundTask> {
        match self {
            TaskBinding::Task(task) => vec![BoundTask::new(task, None)],
            TaskBinding::List(items) => items.iter().flat_map(TaskItem::tasks).collect(),
            TaskBinding::Topics(map) => topics(map),
        }
    }
}

impl TaskItem {
    fn tasks(&self) -> Vec<BoundTask> {
        match self {
            TaskItem::Task(task) => vec![BoundTask::new(task, None)],
            TaskItem::Topics(map) => topics(map),
        }
    }
}

fn topics(map: &OrderedMap<String>) -> Vec<BoundTask> {
    map.iter()
        .map(|(task, topic)| BoundTask::new(task, Some(topic.clone())))
        .collect()
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub mqtt: Option<PartialMqttSettings>,
    pub topics: Option<PartialTopicSettings>,
    pub log: Option<PartialLogSettings>,
    pub schedule: Option<ScheduleTable>,
}

/// Partial MQTT settings.
#[derive(Debug, Deserialize)]
pub struct PartialMqttSettings {
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub clean_session: Option<bool>,
    pub keep_alive_secs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: Option<u8>,
    pub retain: Option<bool>,
    pub reconnect_delay_secs: Option<u64>,
    pub birth: Option<PartialAnnouncement>,
    pub will: Option<PartialAnnouncement>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAnnouncement {
    pub topic: Option<String>,
    pub payload: Option<String>,
    pub qos: Option<u8>,
    pub retain: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTopicSettings {
    pub prefix: Option<String>,
    pub request: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialAnnouncement {
    pub fn merge(self, default: Announcement) -> Announcement {
        Announcement {
            topic: self.topic.unwrap_or(default.topic),
            payload: self.payload.unwrap_or(default.payload),
            qos: self.qos.unwrap_or(default.qos),
            retain: self.retain.unwrap_or(default.retain),
        }
    }
}

/// Provides default values for `Settings`.
///
/// The topic prefix embeds the host name so several machines can share a
/// broker without colliding.
impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings {
                broker: "localhost".to_string(),
                port: 1883,
                client_id: format!("psmqtt-{}", std::process::id()),
                clean_session: false,
                keep_alive_secs: 60,
                username: None,
                password: None,
                qos: 0,
                retain: false,
                reconnect_delay_secs: 10,
                birth: Announcement {
                    topic: "clients/psmqtt".to_string(),
                    payload: "Ola!".to_string(),
                    qos: 0,
                    retain: false,
                },
                will: Announcement {
                    topic: "clients/psmqtt".to_string(),
                    payload: "Adios!".to_string(),
                    qos: 0,
                    retain: false,
                },
            },
            topics: TopicSettings {
                prefix: format!("psmqtt/{}/", host_name()),
                request: "request".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
            schedule: ScheduleTable::default(),
        }
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl TopicSettings {
    /// Root under which request topics arrive, or `None` when requests are
    /// disabled.
    pub fn request_root(&self) -> Option<String> {
        if self.request.is_empty() {
            None
        } else {
            Some(format!("{}{}/", self.prefix, self.request))
        }
    }
}
