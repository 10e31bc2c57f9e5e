//! CLI for psmqtt
//!
//! Connects to the broker, answers requests and runs the configured
//! schedule until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use psmqtt::bridge::{DispatchSettings, Dispatcher};
use psmqtt::config::load_config_from;
use psmqtt::handlers;
use psmqtt::resolver::Resolver;
use psmqtt::scheduler::Scheduler;
use psmqtt::transport::{MqttPublisher, RequestRouter, connect, run_event_loop};
use psmqtt::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "psmqtt", version, about = "Publishes host metrics to an MQTT broker")]
struct Cli {
    /// Configuration file to load instead of `config/default`
    #[arg(long, env = "PSMQTTCONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding `log.level` from the configuration
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"));
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(2);
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.log.level));

    let (client, eventloop) = connect(&settings.mqtt);
    let publisher = Arc::new(MqttPublisher::new(client.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        DispatchSettings {
            topic_prefix: settings.topics.prefix.clone(),
            qos: settings.mqtt.qos,
            retain: settings.mqtt.retain,
        },
        Resolver::new(handlers::builtin()),
        publisher,
    ));

    let scheduler = Scheduler::from_table(&settings.schedule, dispatcher.clone());
    info!("Loaded {} schedule entries", scheduler.entries().len());
    tokio::spawn(scheduler.run());

    let router = RequestRouter::new(
        client,
        settings.mqtt.clone(),
        settings.topics.request_root(),
        dispatcher,
    );

    tokio::select! {
        _ = run_event_loop(eventloop, router) => {
            error!("MQTT event loop exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    ExitCode::SUCCESS
}
