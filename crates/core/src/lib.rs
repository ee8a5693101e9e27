pub mod config;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig, SlackConfig,
    DEFAULT_BOT_NAME,
};
