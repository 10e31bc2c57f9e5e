use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error};

use crate::bridge::message::{PublishRequest, Publisher};
use crate::bridge::topic::TopicTemplate;
use crate::payload;
use crate::resolver::{Resolver, Value};
use crate::utils::{Error, Result};

/// Publishing parameters shared by every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Prepended to every outbound topic and stripped from inbound tasks.
    pub topic_prefix: String,
    pub qos: u8,
    pub retain: bool,
}

/// Resolves tasks and publishes their values.
///
/// The dispatcher is shared between the request loop and the scheduler, so
/// it holds no mutable state apart from the failure counter.
pub struct Dispatcher {
    settings: DispatchSettings,
    resolver: Resolver,
    publisher: Arc<dyn Publisher>,
    failures: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        resolver: Resolver,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            settings,
            resolver,
            publisher,
            failures: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Number of dispatches that ended on the error topic.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Builds the topic template for `topic_source`, adding the prefix when
    /// it is missing.
    pub fn template(&self, topic_source: &str) -> TopicTemplate {
        let prefix = &self.settings.topic_prefix;
        if topic_source.starts_with(prefix.as_str()) {
            TopicTemplate::parse(topic_source)
        } else {
            TopicTemplate::parse(format!("{prefix}{topic_source}"))
        }
    }

    /// Resolves `task` and publishes the result to `topic_source`.
    ///
    /// Failures are published to the topic's error subtopic and logged; they
    /// are never returned.
    pub fn dispatch(&self, task: &str, topic_source: &str) {
        let task = task
            .strip_prefix(self.settings.topic_prefix.as_str())
            .unwrap_or(task);
        let topic = self.template(topic_source);

        match self.publish_task(task, &topic) {
            Ok(count) => debug!("{} published {} value(s) to {}", task, count, topic.topic()),
            Err(e) => self.fail(task, &topic, &e),
        }
    }

    fn publish_task(&self, task: &str, topic: &TopicTemplate) -> Result<usize> {
        let value = self.resolver.resolve(task)?;

        if value.is_multi() && !topic.is_multi_valued() {
            return Err(Error::AmbiguousFanOut {
                task: task.to_string(),
                topic: topic.topic().to_string(),
            });
        }

        match value {
            Value::Seq(items) => {
                let entries = items.iter().enumerate().map(|(i, v)| (i.to_string(), v));
                Ok(self.fan_out(task, topic, entries))
            }
            Value::Map(entries) => {
                let entries = entries.iter().map(|(k, v)| (k.clone(), v));
                Ok(self.fan_out(task, topic, entries))
            }
            scalar => {
                let payload = payload::encode(&scalar)?;
                self.send(topic.topic().to_string(), payload);
                Ok(1)
            }
        }
    }

    /// Publishes each entry to its own subtopic. An element that cannot be
    /// published is reported on its own and does not stop its siblings.
    fn fan_out<'a, I>(&self, task: &str, topic: &TopicTemplate, entries: I) -> usize
    where
        I: Iterator<Item = (String, &'a Value)>,
    {
        let mut published = 0;
        for (key, value) in entries {
            let subtopic = topic.expand(&key);
            match subtopic.and_then(|t| payload::encode(value).map(|p| (t, p))) {
                Ok((subtopic, payload)) => {
                    self.send(subtopic, payload);
                    published += 1;
                }
                Err(e) => self.fail(&format!("{task}[{key}]"), topic, &e),
            }
        }
        published
    }

    fn fail(&self, task: &str, topic: &TopicTemplate, err: &Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        error!("{}: {}", task, err);
        self.send(topic.error_topic(), err.to_string());
    }

    fn send(&self, topic: String, payload: String) {
        self.publisher.publish(PublishRequest {
            topic,
            payload,
            qos: self.settings.qos,
            retain: self.settings.retain,
        });
    }
}
