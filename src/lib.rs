//! # psmqtt
//!
//! `psmqtt` bridges an MQTT broker to a namespace of value handlers. Values
//! are published on request (a message on the request topic) or on a
//! recurring schedule.
//!
//! ## Core Modules
//!
//! - `bridge`: topic templates with a single wildcard, and the dispatcher that
//!   resolves a task and publishes its value to one or many topics.
//! - `resolver`: walks a task path through nested handler namespaces and
//!   applies output formats.
//! - `payload`: turns a resolved value into its wire text.
//! - `scheduler`: recurrence rules and the loop that re-arms them.
//! - `handlers`: built-in host metric handlers.
//! - `config`: loads settings from a file and the environment.
//! - `transport`: the MQTT client side.
//! - `utils`: error type and logging setup.

pub mod bridge;
pub mod config;
pub mod handlers;
pub mod payload;
pub mod resolver;
pub mod scheduler;
pub mod transport;
pub mod utils;

pub use utils::{Error, Result};
