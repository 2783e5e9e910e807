use crate::config::{GatewayConfig, LedgerMode};
use crate::rate_limit::RateLimiter;
use anyhow::Context;
use sequencer::config::AssetSymbols;
use sequencer::{AuditSink, ExchangeOrchestrator, LedgerClient, RpcLedger, SimulatedLedger, TracingAuditSink};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExchangeOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ExchangeOrchestrator>, rate_limiter: RateLimiter) -> Self {
        Self {
            orchestrator,
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Wire the ledger backend, audit sink and orchestrator from configuration.
    /// An RPC backend must agree with the exchange on the stable token.
    pub async fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let ledger: Arc<dyn LedgerClient> = match config.ledger_mode {
            LedgerMode::Rpc => {
                let rpc = config
                    .rpc
                    .clone()
                    .context("ledger_mode = \"rpc\" requires an `rpc` section")?;
                tracing::info!(url = %rpc.url, signer = %rpc.signer, "Using JSON-RPC ledger");
                let ledger = RpcLedger::new(rpc)?;
                ledger
                    .verify_stable_token()
                    .await
                    .context("exchange contract check failed")?;
                Arc::new(ledger)
            }
            LedgerMode::Simulated => {
                tracing::warn!(signer = %config.simulated_signer, "Using simulated ledger");
                Arc::new(SimulatedLedger::development(config.simulated_signer.clone())?)
            }
        };

        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let orchestrator = ExchangeOrchestrator::new(ledger, audit, config.sequencer.clone());

        Ok(Self::new(Arc::new(orchestrator), RateLimiter::new(config.rate_limit)))
    }

    pub fn symbols(&self) -> &AssetSymbols {
        &self.orchestrator.config().symbols
    }
}
