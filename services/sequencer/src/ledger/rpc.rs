//! JSON-RPC ledger client
//!
//! Talks to an EVM-style node. Submissions use `eth_sendTransaction`, so
//! the node holds the signing key for `RpcConfig::signer`. Confirmation is
//! polled with `eth_getTransactionReceipt` until a receipt appears.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};
use types::exchange::{ContractAddresses, Direction, ExchangeState, TokenMetadata};
use types::ids::{Address, ConfirmationId};
use types::numeric::{Asset, AssetAmount, Rate};

use super::abi::{self, Token};
use super::{Confirmation, LedgerClient, LedgerError, LedgerOperation, PendingHandle, SubmitOptions};
use crate::config::RpcConfig;

const APPROVE: &str = "approve(address,uint256)";
const BALANCE_OF: &str = "balanceOf(address)";
const ALLOWANCE: &str = "allowance(address,address)";
const NAME: &str = "name()";
const SYMBOL: &str = "symbol()";
const TOTAL_SUPPLY: &str = "totalSupply()";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<String>,
    block_number: Option<String>,
    gas_used: String,
    effective_gas_price: Option<String>,
}

pub struct RpcLedger {
    client: Client,
    config: RpcConfig,
    request_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(config: RpcConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!(method, id = request.id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!("HTTP {}", response.status())));
        }

        let body: JsonRpcResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(body.result).map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout(self.config.request_timeout())
        } else {
            LedgerError::Transport(err.to_string())
        }
    }

    /// `eth_call` against `to`, returning the raw hex result
    async fn call_raw(&self, to: &Address, data: String) -> Result<String, LedgerError> {
        self.call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    /// `eth_call` against `to`, decoding a single `uint256` result
    async fn call_uint(&self, to: &Address, data: String) -> Result<u128, LedgerError> {
        abi::decode_uint(&self.call_raw(to, data).await?)
    }

    /// Stable token the exchange contract is bound to
    async fn exchange_stable_token(&self) -> Result<Address, LedgerError> {
        let result = self
            .call_raw(&self.config.exchange, abi::encode_call(&self.config.methods.stable_token, &[]))
            .await?;
        abi::decode_address(&result)
    }

    /// Fail unless the exchange pays out the configured stable token.
    /// Approvals would otherwise be granted on the wrong contract.
    pub async fn verify_stable_token(&self) -> Result<(), LedgerError> {
        let reported = self.exchange_stable_token().await?;
        check_stable_token(&self.config.stable_token, &reported)?;
        debug!(stable_token = %reported, "Exchange stable token matches configuration");
        Ok(())
    }

    async fn native_balance(&self, holder: &Address) -> Result<u128, LedgerError> {
        let result: String = self.call("eth_getBalance", json!([holder, "latest"])).await?;
        abi::decode_quantity(&result)
    }

    fn token_contract(&self, asset: Asset) -> Result<&Address, LedgerError> {
        match asset {
            Asset::STABLE => Ok(&self.config.stable_token),
            Asset::CUSTOM => Ok(&self.config.custom_token),
            Asset::NATIVE => Err(LedgerError::Unsupported("native asset has no token contract".to_string())),
        }
    }

    /// Stable units per whole unit of `asset`, as reported by the exchange
    async fn stable_price(&self, asset: Asset) -> Result<Rate, LedgerError> {
        let (method, decimals) = match asset {
            Asset::NATIVE => (&self.config.methods.native_rate, self.config.rate_decimals.native),
            Asset::CUSTOM => (&self.config.methods.custom_rate, self.config.rate_decimals.custom),
            Asset::STABLE => return Err(LedgerError::Unsupported("stable/stable rate".to_string())),
        };
        let raw = self
            .call_uint(&self.config.exchange, abi::encode_call(method, &[]))
            .await?;
        Rate::from_scaled(raw, decimals).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    /// Transaction object for `eth_sendTransaction`
    fn transaction(&self, operation: &LedgerOperation, options: &SubmitOptions) -> Result<Value, LedgerError> {
        let sequence = options
            .sequence
            .ok_or_else(|| LedgerError::Unsupported("submission without a sequence".to_string()))?;

        let (to, data) = match operation {
            LedgerOperation::Authorize { amount } => {
                let token = self.token_contract(amount.asset())?;
                let data = abi::encode_call(
                    APPROVE,
                    &[Token::Address(&self.config.exchange), Token::Uint(amount.units())],
                );
                (token, data)
            }
            LedgerOperation::Exchange { direction, amount } => {
                let methods = &self.config.methods;
                let data = match direction {
                    Direction::BuyNative => abi::encode_call(&methods.buy_native, &[Token::Uint(amount.units())]),
                    Direction::SellNative => abi::encode_call(&methods.sell_native, &[]),
                    Direction::BuyCustom => abi::encode_call(&methods.buy_custom, &[Token::Uint(amount.units())]),
                    Direction::SellCustom => abi::encode_call(&methods.sell_custom, &[Token::Uint(amount.units())]),
                };
                (&self.config.exchange, data)
            }
        };

        let mut tx = json!({
            "from": self.config.signer,
            "to": to,
            "data": data,
            "nonce": abi::encode_quantity(u128::from(sequence)),
        });
        if let Some(limit) = options.resource_limit {
            tx["gas"] = json!(abi::encode_quantity(u128::from(limit)));
        }
        if let Some(value) = options.value_attached {
            tx["value"] = json!(abi::encode_quantity(value.units()));
        }
        Ok(tx)
    }
}

fn check_stable_token(configured: &Address, reported: &Address) -> Result<(), LedgerError> {
    if configured != reported {
        return Err(LedgerError::Misconfigured(format!(
            "stable token {configured} configured, exchange uses {reported}"
        )));
    }
    Ok(())
}

fn confirmation_from_receipt(id: &ConfirmationId, receipt: TransactionReceipt) -> Result<Confirmation, LedgerError> {
    let succeeded = match receipt.status.as_deref() {
        Some(status) => abi::decode_quantity(status)? == 1,
        None => return Err(LedgerError::Decode(format!("receipt {id} has no status"))),
    };
    let block = match receipt.block_number.as_deref() {
        Some(block) => u64::try_from(abi::decode_quantity(block)?)
            .map_err(|e| LedgerError::Decode(e.to_string()))?,
        None => 0,
    };
    let gas_used = abi::decode_quantity(&receipt.gas_used)?;
    let gas_price = match receipt.effective_gas_price.as_deref() {
        Some(price) => abi::decode_quantity(price)?,
        None => 0,
    };
    let fee = gas_used
        .checked_mul(gas_price)
        .ok_or_else(|| LedgerError::Decode("fee overflow".to_string()))?;

    Ok(Confirmation {
        confirmation_id: id.clone(),
        succeeded,
        block,
        fee: AssetAmount::from_units(Asset::NATIVE, fee),
    })
}

#[async_trait]
impl LedgerClient for RpcLedger {
    fn signer(&self) -> &Address {
        &self.config.signer
    }

    async fn pending_sequence_count(&self, identity: &Address) -> Result<u64, LedgerError> {
        let result: String = self
            .call("eth_getTransactionCount", json!([identity, "pending"]))
            .await?;
        u64::try_from(abi::decode_quantity(&result)?).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn balance(&self, asset: Asset, holder: &Address) -> Result<AssetAmount, LedgerError> {
        let units = match asset {
            Asset::NATIVE => self.native_balance(holder).await?,
            token => {
                let contract = self.token_contract(token)?;
                self.call_uint(contract, abi::encode_call(BALANCE_OF, &[Token::Address(holder)]))
                    .await?
            }
        };
        Ok(AssetAmount::from_units(asset, units))
    }

    async fn authorization(&self, asset: Asset, owner: &Address) -> Result<AssetAmount, LedgerError> {
        let contract = self.token_contract(asset)?;
        let data = abi::encode_call(
            ALLOWANCE,
            &[Token::Address(owner), Token::Address(&self.config.exchange)],
        );
        let units = self.call_uint(contract, data).await?;
        Ok(AssetAmount::from_units(asset, units))
    }

    async fn rate(&self, from: Asset, to: Asset) -> Result<Rate, LedgerError> {
        match (from, to) {
            (Asset::STABLE, other) if other != Asset::STABLE => self
                .stable_price(other)
                .await?
                .inverse()
                .map_err(|e| LedgerError::Decode(e.to_string())),
            (other, Asset::STABLE) if other != Asset::STABLE => self.stable_price(other).await,
            _ => Err(LedgerError::Unsupported(format!("pair {from}/{to}"))),
        }
    }

    async fn reserve(&self, asset: Asset) -> Result<AssetAmount, LedgerError> {
        let exchange = &self.config.exchange;
        let units = match asset {
            Asset::NATIVE => self.native_balance(exchange).await?,
            Asset::STABLE => {
                self.call_uint(exchange, abi::encode_call(&self.config.methods.stable_reserve, &[]))
                    .await?
            }
            Asset::CUSTOM => {
                self.call_uint(
                    &self.config.custom_token,
                    abi::encode_call(BALANCE_OF, &[Token::Address(exchange)]),
                )
                .await?
            }
        };
        Ok(AssetAmount::from_units(asset, units))
    }

    async fn exchange_state(&self) -> Result<ExchangeState, LedgerError> {
        let exchange = &self.config.exchange;
        let token = &self.config.custom_token;
        let methods = &self.config.methods;

        let (name, symbol, cap, total_supply, paused, stable_token) = tokio::try_join!(
            self.call_raw(token, abi::encode_call(NAME, &[])),
            self.call_raw(token, abi::encode_call(SYMBOL, &[])),
            self.call_uint(token, abi::encode_call(&methods.custom_cap, &[])),
            self.call_uint(token, abi::encode_call(TOTAL_SUPPLY, &[])),
            self.call_raw(exchange, abi::encode_call(&methods.paused, &[])),
            self.exchange_stable_token(),
        )?;

        Ok(ExchangeState {
            paused: abi::decode_bool(&paused)?,
            token: TokenMetadata {
                name: abi::decode_string(&name)?,
                symbol: abi::decode_string(&symbol)?,
                cap: AssetAmount::from_units(Asset::CUSTOM, cap),
                total_supply: AssetAmount::from_units(Asset::CUSTOM, total_supply),
            },
            addresses: ContractAddresses {
                exchange: exchange.clone(),
                stable_token,
                custom_token: token.clone(),
            },
        })
    }

    async fn submit(
        &self,
        operation: &LedgerOperation,
        options: &SubmitOptions,
    ) -> Result<PendingHandle, LedgerError> {
        let tx = self.transaction(operation, options)?;
        let sequence = options.sequence.unwrap_or_default();
        let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        debug!(sequence, hash = %hash, operation = %operation.label(), "Transaction sent");
        Ok(PendingHandle {
            id: ConfirmationId::new(hash),
            sequence,
        })
    }

    async fn await_confirmation(&self, handle: &PendingHandle) -> Result<Confirmation, LedgerError> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .call("eth_getTransactionReceipt", json!([handle.id.as_str()]))
                .await?;
            if let Some(receipt) = receipt {
                return confirmation_from_receipt(&handle.id, receipt);
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}
