use serde::{Deserialize, Serialize};
use types::exchange::{Direction, MarketSnapshot};
use sequencer::config::AssetSymbols;

/// Success envelope: `{ "success": true, "data": ... }`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Amounts may arrive as JSON strings or numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn into_string(self) -> String {
        match self {
            AmountInput::Text(text) => text,
            AmountInput::Number(number) => number.to_string(),
        }
    }
}

/// `POST /exchange` body: either `direction` or the legacy
/// `tokenSymbol` + `isBuying` pair
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeBody {
    pub amount: Option<AmountInput>,
    pub direction: Option<Direction>,
    pub token_symbol: Option<String>,
    pub is_buying: Option<bool>,
}

/// Body of the per-direction routes
#[derive(Debug, Clone, Deserialize)]
pub struct AmountBody {
    pub amount: Option<AmountInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteParams {
    pub direction: Direction,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    #[serde(flatten)]
    pub snapshot: MarketSnapshot,
    pub symbols: AssetSymbols,
}
