//! The `bridge` module connects resolved task values to broker topics.
//!
//! - `topic`: topic templates with an optional fan-out wildcard.
//! - `message`: the publish request and the [`Publisher`] boundary the
//!   broker transport implements.
//! - `dispatcher`: resolves a task, picks single or fan-out publishing and
//!   reports failures on the error topic.

pub mod dispatcher;
pub mod message;
pub mod topic;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use message::{PublishRequest, Publisher};
pub use topic::{TopicTemplate, Wildcard};
