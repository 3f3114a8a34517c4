//! # Prometheus Metrics
//!
//! Vault activity and pool state, scraped at `/metrics` on the metrics port.
//! Everything lives in a dedicated registry prefixed `lendvault_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use lendvault_contracts::{Amount, Runtime};

/// Smallest units per whole unit, for gauge conversion.
const UNIT: f64 = 1e18;

/// Metric handles for the node.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Successful transactions, labelled by call (`deposit`, `withdraw`, ...).
    pub transactions_total: IntCounterVec,
    /// Reverted transactions, labelled by error kind.
    pub failed_transactions_total: IntCounterVec,
    pub deposits_total: IntCounter,
    pub withdrawals_total: IntCounter,
    pub partial_withdrawals_total: IntCounter,
    /// Outstanding shares in whole units.
    pub total_shares: Gauge,
    /// Native value held by the vault in whole units.
    pub pool_balance: Gauge,
    pub holders: IntGauge,
    /// Time from request to receipt, lock wait included.
    pub transaction_latency_seconds: Histogram,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("lendvault".into()), None)
            .expect("failed to create prometheus registry");

        let transactions_total = IntCounterVec::new(
            Opts::new("transactions_total", "Executed transactions by call"),
            &["call"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_total.clone()))
            .expect("metric registration");

        let failed_transactions_total = IntCounterVec::new(
            Opts::new(
                "failed_transactions_total",
                "Reverted transactions by error kind",
            ),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(failed_transactions_total.clone()))
            .expect("metric registration");

        let deposits_total = IntCounter::new("deposits_total", "Successful deposits")
            .expect("metric creation");
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration");

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Successful full withdrawals")
                .expect("metric creation");
        registry
            .register(Box::new(withdrawals_total.clone()))
            .expect("metric registration");

        let partial_withdrawals_total = IntCounter::new(
            "partial_withdrawals_total",
            "Successful partial withdrawals",
        )
        .expect("metric creation");
        registry
            .register(Box::new(partial_withdrawals_total.clone()))
            .expect("metric registration");

        let total_shares = Gauge::new("total_shares", "Outstanding shares in whole units")
            .expect("metric creation");
        registry
            .register(Box::new(total_shares.clone()))
            .expect("metric registration");

        let pool_balance = Gauge::new(
            "pool_balance",
            "Native value held by the vault in whole units",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pool_balance.clone()))
            .expect("metric registration");

        let holders = IntGauge::new("holders", "Accounts with a non-zero share balance")
            .expect("metric creation");
        registry
            .register(Box::new(holders.clone()))
            .expect("metric registration");

        let transaction_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transaction_latency_seconds",
                "Transaction handling latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(transaction_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            transactions_total,
            failed_transactions_total,
            deposits_total,
            withdrawals_total,
            partial_withdrawals_total,
            total_shares,
            pool_balance,
            holders,
            transaction_latency_seconds,
        }
    }

    /// Records a successful call by name.
    pub fn record_success(&self, call: &str) {
        self.transactions_total.with_label_values(&[call]).inc();
        match call {
            "deposit" => self.deposits_total.inc(),
            "withdraw" => self.withdrawals_total.inc(),
            "withdraw_partial" => self.partial_withdrawals_total.inc(),
            _ => {}
        }
    }

    pub fn record_failure(&self, kind: &str) {
        self.failed_transactions_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Refreshes the pool gauges from the runtime.
    pub fn observe(&self, runtime: &Runtime) {
        self.total_shares
            .set(to_units(runtime.vault().total_supply()));
        self.pool_balance.set(to_units(runtime.pool_balance()));
        self.holders
            .set(runtime.vault().ledger().holder_count() as i64);
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_units(amount: Amount) -> f64 {
    amount as f64 / UNIT
}

/// Shared handle passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Renders `/metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
