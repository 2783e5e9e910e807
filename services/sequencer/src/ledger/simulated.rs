//! In-process ledger that models the exchange contract
//!
//! Tracks per-holder balances, spending authorizations granted to the
//! exchange, exchange reserves, a stable-denominated price per non-stable
//! asset, a pause flag and custom token metadata. Submissions must carry
//! exactly the next sequence number. Effects apply when the confirmation
//! is awaited, so rates or reserves changed in between are observed the
//! way a real ledger would.
//!
//! Used as the local-development backend of the gateway and as the test
//! double for the core.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use types::errors::AmountError;
use types::exchange::{ContractAddresses, Direction, ExchangeState, TokenMetadata};
use types::ids::{Address, ConfirmationId};
use types::numeric::{Asset, AssetAmount, Rate};

use super::{Confirmation, LedgerClient, LedgerError, LedgerOperation, PendingHandle, SubmitOptions};

/// Resources an authorization consumes
pub const AUTHORIZATION_COST: u64 = 46_000;
/// Resources an exchange action consumes
pub const EXCHANGE_COST: u64 = 120_000;

/// Fault to inject into the next submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Dispatch fails before the ledger accepts it; sequence not consumed
    DispatchError,
    /// Accepted, then reverted on confirmation
    Revert,
    /// Accepted, but the confirmation never arrives
    NeverConfirm,
    /// Accepted, but the confirmation wait fails with a transport error
    ConfirmationError,
}

/// Record of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedOperation {
    pub sequence: u64,
    pub operation: LedgerOperation,
    pub options: SubmitOptions,
}

#[derive(Debug)]
struct PendingTx {
    operation: LedgerOperation,
    options: SubmitOptions,
    fault: Option<Fault>,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_sequence: u64,
    block: u64,
    tx_counter: u64,
    balances: HashMap<(Asset, Address), u128>,
    authorizations: HashMap<(Asset, Address), u128>,
    reserves: HashMap<Asset, u128>,
    /// Stable units per whole unit of each non-stable asset
    prices: HashMap<Asset, Rate>,
    /// Price changes applied just before the next confirmation
    price_moves: Vec<(Asset, Rate)>,
    pending: HashMap<ConfirmationId, PendingTx>,
    submissions: Vec<SubmittedOperation>,
    faults: VecDeque<Fault>,
    sequence_reads: u64,
    /// Balance, authorization, rate and reserve reads served
    queries: u64,
    sequence_source_down: bool,
    /// Native base units charged per resource consumed
    fee_per_resource: u128,
    paused: bool,
    token_name: String,
    token_symbol: String,
    /// Custom asset supply cap in base units
    token_cap: u128,
}

/// Simulated ledger bound to one signing identity
pub struct SimulatedLedger {
    signer: Address,
    contracts: ContractAddresses,
    state: Mutex<LedgerState>,
}

impl SimulatedLedger {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            contracts: ContractAddresses {
                exchange: Address::zero(),
                stable_token: Address::zero(),
                custom_token: Address::zero(),
            },
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Ledger seeded for local development: 2000 stable per native unit,
    /// 1.2 stable per custom unit, and funded reserves and signer balances.
    pub fn development(signer: Address) -> Result<Self, AmountError> {
        let whole = |asset: Asset, n: u128| AssetAmount::from_units(asset, n * asset.unit());
        Ok(Self::new(signer.clone())
            .with_price(Asset::NATIVE, Rate::new(2000, 1)?)
            .with_price(Asset::CUSTOM, Rate::new(6, 5)?)
            .with_reserve(whole(Asset::NATIVE, 100))
            .with_reserve(whole(Asset::STABLE, 1_000_000))
            .with_reserve(whole(Asset::CUSTOM, 1_000_000))
            .with_balance(&signer, whole(Asset::NATIVE, 50))
            .with_balance(&signer, whole(Asset::STABLE, 100_000))
            .with_balance(&signer, whole(Asset::CUSTOM, 100_000))
            .with_token("Daju Token", "DAJU", whole(Asset::CUSTOM, 10_000_000)))
    }

    // ───────────────────────── Builders ─────────────────────────

    pub fn with_sequence(self, next: u64) -> Self {
        self.lock().next_sequence = next;
        self
    }

    pub fn with_price(self, asset: Asset, stable_per_unit: Rate) -> Self {
        self.set_price(asset, stable_per_unit);
        self
    }

    pub fn with_balance(self, holder: &Address, amount: AssetAmount) -> Self {
        self.set_balance(holder, amount);
        self
    }

    pub fn with_reserve(self, amount: AssetAmount) -> Self {
        self.set_reserve(amount);
        self
    }

    /// Pre-grant the exchange a spending authorization from `owner`
    pub fn with_authorization(self, owner: &Address, amount: AssetAmount) -> Self {
        self.lock()
            .authorizations
            .insert((amount.asset(), owner.clone()), amount.units());
        self
    }

    pub fn with_fee_per_resource(self, fee: u128) -> Self {
        self.lock().fee_per_resource = fee;
        self
    }

    /// Custom token metadata; total supply is derived from holdings
    pub fn with_token(self, name: &str, symbol: &str, cap: AssetAmount) -> Self {
        {
            let mut state = self.lock();
            state.token_name = name.to_string();
            state.token_symbol = symbol.to_string();
            state.token_cap = cap.units();
        }
        self
    }

    pub fn with_contracts(mut self, contracts: ContractAddresses) -> Self {
        self.contracts = contracts;
        self
    }

    // ───────────────────────── Mutators ─────────────────────────

    pub fn set_price(&self, asset: Asset, stable_per_unit: Rate) {
        self.lock().prices.insert(asset, stable_per_unit);
    }

    pub fn set_balance(&self, holder: &Address, amount: AssetAmount) {
        self.lock()
            .balances
            .insert((amount.asset(), holder.clone()), amount.units());
    }

    pub fn set_reserve(&self, amount: AssetAmount) {
        self.lock().reserves.insert(amount.asset(), amount.units());
    }

    /// Change `asset`'s price right before the next confirmation applies
    pub fn move_price_before_next_confirmation(&self, asset: Asset, stable_per_unit: Rate) {
        self.lock().price_moves.push((asset, stable_per_unit));
    }

    /// Queue a fault for the next accepted (or attempted) submission
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    pub fn set_sequence_source_available(&self, available: bool) {
        self.lock().sequence_source_down = !available;
    }

    /// While paused every exchange action reverts
    pub fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    // ───────────────────────── Inspection ─────────────────────────

    /// Accepted submissions in order
    pub fn submissions(&self) -> Vec<SubmittedOperation> {
        self.lock().submissions.clone()
    }

    /// Number of pending-sequence reads served
    pub fn sequence_reads(&self) -> u64 {
        self.lock().sequence_reads
    }

    /// Number of read-only queries served, excluding sequence reads
    pub fn queries(&self) -> u64 {
        self.lock().queries
    }

    pub fn next_sequence(&self) -> u64 {
        self.lock().next_sequence
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerState {
    fn rate(&self, from: Asset, to: Asset) -> Result<Rate, LedgerError> {
        let price = |asset: Asset| {
            self.prices
                .get(&asset)
                .copied()
                .ok_or_else(|| LedgerError::Unsupported(format!("no rate for {asset}")))
        };
        match (from, to) {
            (Asset::STABLE, other) if other != Asset::STABLE => price(other)?
                .inverse()
                .map_err(|e| LedgerError::Rpc {
                    code: 3,
                    message: e.to_string(),
                }),
            (other, Asset::STABLE) if other != Asset::STABLE => price(other),
            _ => Err(LedgerError::Unsupported(format!("pair {from}/{to}"))),
        }
    }

    fn balance(&self, asset: Asset, holder: &Address) -> u128 {
        self.balances.get(&(asset, holder.clone())).copied().unwrap_or(0)
    }

    fn adjust_balance(&mut self, asset: Asset, holder: &Address, f: impl FnOnce(u128) -> u128) {
        let entry = self.balances.entry((asset, holder.clone())).or_insert(0);
        *entry = f(*entry);
    }

    /// Apply a confirmed operation; `false` means revert with no effect.
    fn apply(&mut self, signer: &Address, tx: &PendingTx) -> bool {
        let cost = match tx.operation {
            LedgerOperation::Authorize { .. } => AUTHORIZATION_COST,
            LedgerOperation::Exchange { .. } => EXCHANGE_COST,
        };
        if tx.options.resource_limit.is_some_and(|limit| limit < cost) {
            debug!(cost, limit = ?tx.options.resource_limit, "Simulated out-of-resources revert");
            return false;
        }

        match &tx.operation {
            LedgerOperation::Authorize { amount } => {
                if !amount.asset().needs_authorization() {
                    return false;
                }
                self.authorizations
                    .insert((amount.asset(), signer.clone()), amount.units());
                true
            }
            LedgerOperation::Exchange { direction, amount } => self.apply_exchange(signer, *direction, *amount, &tx.options),
        }
    }

    fn apply_exchange(
        &mut self,
        signer: &Address,
        direction: Direction,
        amount: AssetAmount,
        options: &SubmitOptions,
    ) -> bool {
        let paying = direction.paying();
        let receiving = direction.receiving();
        if self.paused || amount.asset() != paying || amount.is_zero() {
            return false;
        }

        if paying.needs_authorization() {
            let granted = self
                .authorizations
                .get(&(paying, signer.clone()))
                .copied()
                .unwrap_or(0);
            if granted < amount.units() {
                return false;
            }
        } else if options.value_attached != Some(amount) {
            return false;
        }

        if self.balance(paying, signer) < amount.units() {
            return false;
        }

        let output = match self.rate(paying, receiving).and_then(|rate| {
            rate.convert(amount, receiving)
                .map_err(|e| LedgerError::Decode(e.to_string()))
        }) {
            Ok(output) => output,
            Err(_) => return false,
        };

        let reserve = self.reserves.get(&receiving).copied().unwrap_or(0);
        if reserve < output.units() || output.is_zero() {
            return false;
        }

        if paying.needs_authorization() {
            if let Some(granted) = self.authorizations.get_mut(&(paying, signer.clone())) {
                *granted -= amount.units();
            }
        }
        self.adjust_balance(paying, signer, |b| b - amount.units());
        *self.reserves.entry(paying).or_insert(0) += amount.units();
        self.reserves.insert(receiving, reserve - output.units());
        self.adjust_balance(receiving, signer, |b| b + output.units());
        true
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn signer(&self) -> &Address {
        &self.signer
    }

    async fn pending_sequence_count(&self, identity: &Address) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        if state.sequence_source_down {
            return Err(LedgerError::Transport("sequence source unreachable".to_string()));
        }
        state.sequence_reads += 1;
        if identity != &self.signer {
            return Ok(0);
        }
        Ok(state.next_sequence)
    }

    async fn balance(&self, asset: Asset, holder: &Address) -> Result<AssetAmount, LedgerError> {
        let mut state = self.lock();
        state.queries += 1;
        Ok(AssetAmount::from_units(asset, state.balance(asset, holder)))
    }

    async fn authorization(&self, asset: Asset, owner: &Address) -> Result<AssetAmount, LedgerError> {
        if !asset.needs_authorization() {
            return Err(LedgerError::Unsupported(format!("{asset} has no authorization")));
        }
        let mut state = self.lock();
        state.queries += 1;
        let granted = state.authorizations.get(&(asset, owner.clone())).copied().unwrap_or(0);
        Ok(AssetAmount::from_units(asset, granted))
    }

    async fn rate(&self, from: Asset, to: Asset) -> Result<Rate, LedgerError> {
        let mut state = self.lock();
        state.queries += 1;
        state.rate(from, to)
    }

    async fn reserve(&self, asset: Asset) -> Result<AssetAmount, LedgerError> {
        let mut state = self.lock();
        state.queries += 1;
        let units = state.reserves.get(&asset).copied().unwrap_or(0);
        Ok(AssetAmount::from_units(asset, units))
    }

    async fn exchange_state(&self) -> Result<ExchangeState, LedgerError> {
        let mut state = self.lock();
        state.queries += 1;
        let held: u128 = state
            .balances
            .iter()
            .filter(|((asset, _), _)| *asset == Asset::CUSTOM)
            .map(|(_, units)| *units)
            .sum();
        let reserve = state.reserves.get(&Asset::CUSTOM).copied().unwrap_or(0);

        Ok(ExchangeState {
            paused: state.paused,
            token: TokenMetadata {
                name: state.token_name.clone(),
                symbol: state.token_symbol.clone(),
                cap: AssetAmount::from_units(Asset::CUSTOM, state.token_cap),
                total_supply: AssetAmount::from_units(Asset::CUSTOM, held + reserve),
            },
            addresses: self.contracts.clone(),
        })
    }

    async fn submit(
        &self,
        operation: &LedgerOperation,
        options: &SubmitOptions,
    ) -> Result<PendingHandle, LedgerError> {
        let mut state = self.lock();
        let fault = state.faults.pop_front();
        if fault == Some(Fault::DispatchError) {
            return Err(LedgerError::Transport("connection reset during dispatch".to_string()));
        }

        let sequence = options
            .sequence
            .ok_or_else(|| LedgerError::Rpc {
                code: -32000,
                message: "missing sequence".to_string(),
            })?;
        if sequence != state.next_sequence {
            let message = if sequence < state.next_sequence {
                "nonce too low"
            } else {
                "nonce too high"
            };
            return Err(LedgerError::Rpc {
                code: -32000,
                message: message.to_string(),
            });
        }

        state.next_sequence += 1;
        state.tx_counter += 1;
        let id = ConfirmationId::new(format!("0x{:064x}", state.tx_counter));

        state.submissions.push(SubmittedOperation {
            sequence,
            operation: operation.clone(),
            options: options.clone(),
        });
        state.pending.insert(
            id.clone(),
            PendingTx {
                operation: operation.clone(),
                options: options.clone(),
                fault,
            },
        );

        debug!(sequence, id = %id, operation = %operation.label(), "Simulated ledger accepted submission");
        Ok(PendingHandle { id, sequence })
    }

    async fn await_confirmation(&self, handle: &PendingHandle) -> Result<Confirmation, LedgerError> {
        let outcome = {
            let mut state = self.lock();
            let tx = state
                .pending
                .remove(&handle.id)
                .ok_or_else(|| LedgerError::Rpc {
                    code: -32001,
                    message: format!("unknown submission {}", handle.id),
                })?;

            match tx.fault {
                Some(Fault::NeverConfirm) => None,
                Some(Fault::ConfirmationError) => {
                    return Err(LedgerError::Transport("connection lost while waiting".to_string()));
                }
                fault => {
                    let moves: Vec<_> = state.price_moves.drain(..).collect();
                    for (asset, price) in moves {
                        state.prices.insert(asset, price);
                    }

                    let succeeded = fault != Some(Fault::Revert) && state.apply(&self.signer, &tx);

                    let used = match tx.operation {
                        LedgerOperation::Authorize { .. } => AUTHORIZATION_COST,
                        LedgerOperation::Exchange { .. } => EXCHANGE_COST,
                    };
                    let used = tx.options.resource_limit.map_or(used, |limit| limit.min(used));
                    let fee = u128::from(used) * state.fee_per_resource;
                    state.adjust_balance(Asset::NATIVE, &self.signer, |b| b.saturating_sub(fee));

                    state.block += 1;
                    Some(Confirmation {
                        confirmation_id: handle.id.clone(),
                        succeeded,
                        block: state.block,
                        fee: AssetAmount::from_units(Asset::NATIVE, fee),
                    })
                }
            }
        };

        match outcome {
            Some(confirmation) => Ok(confirmation),
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000a1").unwrap()
    }

    fn stable(n: u128) -> AssetAmount {
        AssetAmount::from_units(Asset::STABLE, n * Asset::STABLE.unit())
    }

    #[tokio::test]
    async fn test_rates_both_directions() {
        let ledger = SimulatedLedger::new(signer()).with_price(Asset::NATIVE, Rate::new(2000, 1).unwrap());
        assert_eq!(ledger.rate(Asset::NATIVE, Asset::STABLE).await.unwrap(), Rate::new(2000, 1).unwrap());
        assert_eq!(ledger.rate(Asset::STABLE, Asset::NATIVE).await.unwrap(), Rate::new(1, 2000).unwrap());
        assert!(ledger.rate(Asset::NATIVE, Asset::CUSTOM).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_sequence() {
        let ledger = SimulatedLedger::new(signer()).with_sequence(3);
        let op = LedgerOperation::Authorize { amount: stable(1) };

        let err = ledger
            .submit(&op, &SubmitOptions::default().with_sequence(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { ref message, .. } if message == "nonce too low"));

        let handle = ledger
            .submit(&op, &SubmitOptions::default().with_sequence(3))
            .await
            .unwrap();
        assert_eq!(handle.sequence, 3);
        assert_eq!(ledger.next_sequence(), 4);
    }

    #[tokio::test]
    async fn test_exchange_requires_authorization() {
        let ledger = SimulatedLedger::new(signer())
            .with_price(Asset::CUSTOM, Rate::new(6, 5).unwrap())
            .with_balance(&signer(), stable(1000))
            .with_reserve(AssetAmount::from_units(Asset::CUSTOM, 1_000 * Asset::CUSTOM.unit()));

        let op = LedgerOperation::Exchange {
            direction: Direction::BuyCustom,
            amount: stable(120),
        };
        let handle = ledger.submit(&op, &SubmitOptions::default().with_sequence(0)).await.unwrap();
        let confirmation = ledger.await_confirmation(&handle).await.unwrap();
        assert!(!confirmation.succeeded);

        let auth = LedgerOperation::Authorize { amount: stable(120) };
        let handle = ledger.submit(&auth, &SubmitOptions::default().with_sequence(1)).await.unwrap();
        assert!(ledger.await_confirmation(&handle).await.unwrap().succeeded);

        let handle = ledger.submit(&op, &SubmitOptions::default().with_sequence(2)).await.unwrap();
        assert!(ledger.await_confirmation(&handle).await.unwrap().succeeded);

        let custom = ledger.balance(Asset::CUSTOM, &signer()).await.unwrap();
        assert_eq!(custom.to_string(), "100");
        assert_eq!(ledger.balance(Asset::STABLE, &signer()).await.unwrap(), stable(880));
        assert!(ledger.authorization(Asset::STABLE, &signer()).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_paused_exchange_reverts_actions() {
        let ledger = SimulatedLedger::development(signer()).unwrap();
        ledger.set_paused(true);

        let state = ledger.exchange_state().await.unwrap();
        assert!(state.paused);
        assert_eq!(state.token.symbol, "DAJU");
        // 100k held by the signer plus 1M in reserve
        assert_eq!(state.token.total_supply.to_string(), "1100000");
        assert_eq!(state.token.cap.to_string(), "10000000");

        let amount = AssetAmount::from_units(Asset::NATIVE, Asset::NATIVE.unit());
        let op = LedgerOperation::Exchange {
            direction: Direction::SellNative,
            amount,
        };
        let options = SubmitOptions::default().with_sequence(0).with_value(Some(amount));
        let handle = ledger.submit(&op, &options).await.unwrap();
        assert!(!ledger.await_confirmation(&handle).await.unwrap().succeeded);
    }

    #[tokio::test]
    async fn test_resource_limit_below_cost_reverts() {
        let ledger = SimulatedLedger::new(signer());
        let op = LedgerOperation::Authorize { amount: stable(1) };
        let options = SubmitOptions::default()
            .with_sequence(0)
            .with_resource_limit(Some(AUTHORIZATION_COST - 1));
        let handle = ledger.submit(&op, &options).await.unwrap();
        assert!(!ledger.await_confirmation(&handle).await.unwrap().succeeded);
    }

    #[tokio::test]
    async fn test_fee_charged_in_native() {
        let ledger = SimulatedLedger::new(signer())
            .with_fee_per_resource(10)
            .with_balance(&signer(), AssetAmount::from_units(Asset::NATIVE, 1_000_000_000));
        let op = LedgerOperation::Authorize { amount: stable(1) };
        let handle = ledger.submit(&op, &SubmitOptions::default().with_sequence(0)).await.unwrap();
        let confirmation = ledger.await_confirmation(&handle).await.unwrap();
        assert_eq!(confirmation.fee.units(), u128::from(AUTHORIZATION_COST) * 10);
        assert_eq!(
            ledger.balance(Asset::NATIVE, &signer()).await.unwrap().units(),
            1_000_000_000 - u128::from(AUTHORIZATION_COST) * 10
        );
    }
}
