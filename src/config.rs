use crate::application::executor::PaymentSettings;
use crate::application::scheduler::SchedulerSettings;
use ::config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration, read from `RENTPILOT_*` environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Seconds between monitoring cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_window_days: i64,

    #[serde(default = "default_reminder_window_days")]
    pub reminder_window_days: i64,

    /// Upper bound on one inference call, in seconds
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    // Inference providers
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    // Custodial wallet
    #[serde(default = "default_wallet_api_url")]
    pub wallet_api_url: String,

    #[serde(default)]
    pub wallet_api_key: Option<String>,

    /// Hex entity secret, encrypted afresh for every transfer
    #[serde(default)]
    pub wallet_entity_secret: Option<String>,

    /// Wallet tenants pay from
    #[serde(default)]
    pub tenant_wallet_id: Option<String>,

    /// Settlement address used when a property has none
    #[serde(default)]
    pub owner_address: Option<String>,

    #[serde(default = "default_usdc_token_id")]
    pub usdc_token_id: String,

    #[serde(default = "default_network")]
    pub network: String,

    /// Accept locally generated references when a real transfer is impossible
    #[serde(default = "default_allow_simulated_settlement")]
    pub allow_simulated_settlement: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_upcoming_window_days() -> i64 {
    7
}

fn default_reminder_window_days() -> i64 {
    3
}

fn default_inference_timeout_secs() -> u64 {
    30
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_openai_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4".to_string()
}

fn default_wallet_api_url() -> String {
    "https://api.circle.com".to_string()
}

// USDC on Arc testnet
fn default_usdc_token_id() -> String {
    "e73c8e3f-55f5-5b7c-abf1-9d4c5b0a5ab0".to_string()
}

fn default_network() -> String {
    "ARC-TESTNET".to_string()
}

fn default_allow_simulated_settlement() -> bool {
    true
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RENTPILOT"))
            .build()?
            .try_deserialize()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            check_interval: Duration::from_secs(self.check_interval_secs.max(1)),
            upcoming_window_days: self.upcoming_window_days,
            reminder_window_days: self.reminder_window_days,
        }
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            tenant_wallet_id: non_empty(&self.tenant_wallet_id),
            fallback_owner_address: non_empty(&self.owner_address),
            token_id: self.usdc_token_id.clone(),
            network: self.network.clone(),
            allow_simulated_settlement: self.allow_simulated_settlement,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}
