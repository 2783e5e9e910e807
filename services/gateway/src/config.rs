//! Gateway configuration
//!
//! Sources, lowest priority first: `config/default`, `config/local`, then
//! `GATEWAY__*` environment variables (`__` separates nested keys, e.g.
//! `GATEWAY__RPC__URL`). A `.env` file is loaded first if present.

use serde::{Deserialize, Serialize};
use sequencer::{RpcConfig, SequencerConfig};
use types::ids::Address;

/// Which ledger backend the gateway talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// JSON-RPC node; requires the `rpc` section
    Rpc,
    /// In-process ledger seeded for local development
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub ledger_mode: LedgerMode,

    /// Default `EnvFilter` directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub sequencer: SequencerConfig,

    #[serde(default)]
    pub rpc: Option<RpcConfig>,

    /// Signing identity of the simulated ledger
    #[serde(default = "default_simulated_signer")]
    pub simulated_signer: Address,
}

/// Token bucket applied per caller and route
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_mode: LedgerMode::default(),
            log_level: default_log_level(),
            rate_limit: RateLimitSettings::default(),
            sequencer: SequencerConfig::default(),
            rpc: None,
            simulated_signer: default_simulated_signer(),
        }
    }
}

impl GatewayConfig {
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let config = ::config::Config::builder()
            .add_source(::config::File::with_name("config/default").required(false))
            .add_source(::config::File::with_name("config/local").required(false))
            .add_source(
                ::config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info,gateway=debug,sequencer=debug".to_string()
}

fn default_capacity() -> u32 {
    20
}

fn default_refill_per_sec() -> f64 {
    5.0
}

fn default_simulated_signer() -> Address {
    Address::zero()
}
