use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use switchboard_core::config::{AppConfig, ConfigError, LoadOptions};
use switchboard_rtm::{
    ConnectionRegistry, Dispatcher, HandlerRegistry, NoopTransportFactory, ReconnectPolicy,
    RtmRunner, SetupError,
};

pub struct Application {
    pub config: AppConfig,
    pub bot_names: BTreeSet<String>,
    pub registry: Arc<HandlerRegistry>,
    pub runner: RtmRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

/// Builds the registries and wires the demo handlers. The default binary
/// runs on the noop transport; a deployment swaps in a live factory here.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let connections =
        Arc::new(ConnectionRegistry::from_config(&config.slack, &NoopTransportFactory)?);
    let bot_names = connections.bot_names();
    info!(bots = bot_names.len(), "bot connections configured");

    let registry = Arc::new(HandlerRegistry::new(bot_names.clone()));
    crate::handlers::register_defaults(&registry, &bot_names)?;

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), Arc::clone(&connections)));
    let runner = RtmRunner::new(
        connections,
        dispatcher,
        Duration::from_millis(config.slack.read_interval_ms),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, bot_names, registry, runner })
}
