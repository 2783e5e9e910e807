//! Core configuration
//!
//! Everything that differs between exchange directions (method names,
//! rate scaling) is data here rather than a code branch.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::ids::Address;
use types::numeric::Asset;

/// Settings for the sequencing core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Upper bound on dispatch plus confirmation wait, in seconds
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Resource ceiling attached to every exchange action
    #[serde(default = "default_action_resource_limit")]
    pub action_resource_limit: Option<u64>,

    /// Resource ceiling for authorization submissions (ledger estimates if unset)
    #[serde(default)]
    pub authorization_resource_limit: Option<u64>,

    /// Display symbols for the three assets
    #[serde(default)]
    pub symbols: AssetSymbols,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout(),
            action_resource_limit: default_action_resource_limit(),
            authorization_resource_limit: None,
            symbols: AssetSymbols::default(),
        }
    }
}

impl SequencerConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Human-facing asset symbols
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSymbols {
    #[serde(default = "default_native_symbol")]
    pub native: String,
    #[serde(default = "default_stable_symbol")]
    pub stable: String,
    #[serde(default = "default_custom_symbol")]
    pub custom: String,
}

impl Default for AssetSymbols {
    fn default() -> Self {
        Self {
            native: default_native_symbol(),
            stable: default_stable_symbol(),
            custom: default_custom_symbol(),
        }
    }
}

impl AssetSymbols {
    pub fn symbol(&self, asset: Asset) -> &str {
        match asset {
            Asset::NATIVE => &self.native,
            Asset::STABLE => &self.stable,
            Asset::CUSTOM => &self.custom,
        }
    }
}

/// JSON-RPC ledger connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Node endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Node-managed signing identity
    pub signer: Address,

    /// Exchange contract holding the reserves
    pub exchange: Address,

    /// Stable token contract
    pub stable_token: Address,

    /// Custom token contract
    pub custom_token: Address,

    /// Timeout for a single JSON-RPC request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between confirmation polls, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub methods: ExchangeMethods,

    #[serde(default)]
    pub rate_decimals: RateDecimals,
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Canonical method signatures on the exchange contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeMethods {
    /// Stable units per native unit
    pub native_rate: String,
    /// Stable units per custom unit
    pub custom_rate: String,
    /// Stable reserve held by the exchange
    pub stable_reserve: String,
    pub buy_native: String,
    /// Payable; the native amount is attached as value
    pub sell_native: String,
    pub buy_custom: String,
    pub sell_custom: String,
    /// `bool` pause flag on the exchange
    pub paused: String,
    /// Stable token address the exchange is bound to
    pub stable_token: String,
    /// Supply cap on the custom token contract
    pub custom_cap: String,
}

impl Default for ExchangeMethods {
    fn default() -> Self {
        Self {
            native_rate: "usdcToEthRate()".to_string(),
            custom_rate: "usdcToDajuRate()".to_string(),
            stable_reserve: "getUSDCBalance()".to_string(),
            buy_native: "buyETHWithUSDC(uint256)".to_string(),
            sell_native: "sellETHForUSDC()".to_string(),
            buy_custom: "exchangeUSDCForDAJU(uint256)".to_string(),
            sell_custom: "exchangeDAJUForUSDC(uint256)".to_string(),
            paused: "paused()".to_string(),
            stable_token: "usdcAddress()".to_string(),
            custom_cap: "CAP()".to_string(),
        }
    }
}

/// Fixed-point decimals the exchange reports each stable-denominated rate in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateDecimals {
    pub native: u32,
    pub custom: u32,
}

impl Default for RateDecimals {
    fn default() -> Self {
        Self { native: 0, custom: 18 }
    }
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_action_resource_limit() -> Option<u64> {
    Some(300_000)
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_stable_symbol() -> String {
    "USDC".to_string()
}

fn default_custom_symbol() -> String {
    "DAJU".to_string()
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}
