//! Exchange operation types
//!
//! Directions, quotes, reserve checks, and the terminal outcomes of a
//! logical exchange operation. All of these are derived values: they are
//! recomputed from live ledger reads and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{Address, ConfirmationId, OperationId};
use crate::numeric::{Asset, AssetAmount, Rate};

/// Direction of an exchange, named from the caller's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Pay stable, receive native
    BuyNative,
    /// Pay native, receive stable
    SellNative,
    /// Pay stable, receive custom
    BuyCustom,
    /// Pay custom, receive stable
    SellCustom,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::BuyNative,
        Direction::SellNative,
        Direction::BuyCustom,
        Direction::SellCustom,
    ];

    /// Asset the signing identity pays
    pub fn paying(&self) -> Asset {
        match self {
            Direction::BuyNative | Direction::BuyCustom => Asset::STABLE,
            Direction::SellNative => Asset::NATIVE,
            Direction::SellCustom => Asset::CUSTOM,
        }
    }

    /// Asset the exchange pays out
    pub fn receiving(&self) -> Asset {
        match self {
            Direction::BuyNative => Asset::NATIVE,
            Direction::BuyCustom => Asset::CUSTOM,
            Direction::SellNative | Direction::SellCustom => Asset::STABLE,
        }
    }

    /// Resolve the legacy `{ tokenSymbol, isBuying }` request shape.
    ///
    /// `symbol` names the non-stable side (native or custom asset).
    pub fn from_symbol(symbol: &str, is_buying: bool, native: &str, custom: &str) -> Option<Self> {
        let asset = if symbol.eq_ignore_ascii_case(native) || symbol.eq_ignore_ascii_case("NATIVE") {
            Asset::NATIVE
        } else if symbol.eq_ignore_ascii_case(custom) || symbol.eq_ignore_ascii_case("CUSTOM") {
            Asset::CUSTOM
        } else {
            return None;
        };

        Some(match (asset, is_buying) {
            (Asset::NATIVE, true) => Direction::BuyNative,
            (Asset::NATIVE, false) => Direction::SellNative,
            (_, true) => Direction::BuyCustom,
            (_, false) => Direction::SellCustom,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::BuyNative => "BUY_NATIVE",
            Direction::SellNative => "SELL_NATIVE",
            Direction::BuyCustom => "BUY_CUSTOM",
            Direction::SellCustom => "SELL_CUSTOM",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown direction: {s}"))
    }
}

/// Which submission of a logical operation an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Spending authorization granted to the exchange
    Authorization,
    /// The paying exchange action itself
    Action,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Authorization => f.write_str("authorization"),
            Stage::Action => f.write_str("action"),
        }
    }
}

/// Terminal outcome of a logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Action confirmed as succeeded
    Confirmed,
    /// Ledger explicitly rejected a submission; it did not happen
    Reverted,
    /// Rejected locally; nothing was submitted for the failing step
    PreconditionFailed,
    /// Dispatch or confirmation wait failed; on-ledger effect unknown
    TransportFailed,
}

/// Quote for one direction, derived from a live rate read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeQuote {
    pub direction: Direction,
    pub input_amount: AssetAmount,
    pub input_asset: Asset,
    pub output_asset: Asset,
    pub rate: Rate,
    pub output_amount: AssetAmount,
}

/// Result of comparing a required payout against a live reserve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReserveCheckResult {
    pub sufficient: bool,
    pub required: AssetAmount,
    pub available: AssetAmount,
}

/// Receipt returned for a `Confirmed` logical operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeReceipt {
    pub operation_id: OperationId,
    pub outcome: Outcome,
    pub direction: Direction,
    pub confirmation_id: ConfirmationId,
    /// Present when a spending authorization was submitted first
    pub authorization_id: Option<ConfirmationId>,
    pub input_amount: AssetAmount,
    /// Output computed from the rate read before submission
    pub expected_output: AssetAmount,
    /// Output measured from balances around confirmation; `None` if the
    /// post-confirmation read failed
    pub realized_output: Option<AssetAmount>,
    /// Realized output differs from the expected output
    pub diverged: bool,
    pub block: u64,
}

/// Live rates, reserves and exchange state, read without locking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub identity: Address,
    pub rates: Vec<DirectionRate>,
    pub reserves: Vec<AssetAmount>,
    /// Submissions revert while the exchange is paused
    pub paused: bool,
    pub token: TokenMetadata,
    pub addresses: ContractAddresses,
}

/// Exchange-level state reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeState {
    pub paused: bool,
    pub token: TokenMetadata,
    pub addresses: ContractAddresses,
}

/// Custom asset token metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Maximum supply the token contract allows
    pub cap: AssetAmount,
    pub total_supply: AssetAmount,
}

/// Contracts an exchange touches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractAddresses {
    pub exchange: Address,
    /// Stable token the exchange itself is bound to
    pub stable_token: Address,
    pub custom_token: Address,
}

/// Rate for one direction inside a [`MarketSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionRate {
    pub direction: Direction,
    pub rate: Rate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_assets() {
        assert_eq!(Direction::BuyNative.paying(), Asset::STABLE);
        assert_eq!(Direction::BuyNative.receiving(), Asset::NATIVE);
        assert_eq!(Direction::SellCustom.paying(), Asset::CUSTOM);
        assert_eq!(Direction::SellCustom.receiving(), Asset::STABLE);
        for direction in Direction::ALL {
            assert_ne!(direction.paying(), direction.receiving());
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("buy_native".parse::<Direction>(), Ok(Direction::BuyNative));
        assert_eq!("SELL_CUSTOM".parse::<Direction>(), Ok(Direction::SellCustom));
        assert!("swap".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_from_symbol() {
        assert_eq!(
            Direction::from_symbol("eth", true, "ETH", "DAJU"),
            Some(Direction::BuyNative)
        );
        assert_eq!(
            Direction::from_symbol("DAJU", false, "ETH", "DAJU"),
            Some(Direction::SellCustom)
        );
        assert_eq!(Direction::from_symbol("BTC", true, "ETH", "DAJU"), None);
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&Direction::SellNative).unwrap();
        assert_eq!(json, "\"SELL_NATIVE\"");
    }
}
