use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    /// Hard ceiling on a single generation call, in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// Total attempts for a generation call (1 = no retries).
    #[serde(default = "default_generation_max_attempts")]
    pub generation_max_attempts: usize,
    #[serde(default = "default_generation_retry_base_delay_ms")]
    pub generation_retry_base_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_query_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_generation_max_attempts() -> usize {
    2
}

fn default_generation_retry_base_delay_ms() -> u64 {
    2000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
