//! Inbound feed collaborators - price oracle, mempool source, position ledger

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;

use crate::shared::errors::FeedError;
use crate::shared::types::{
    PendingTransaction, PortfolioInputs, PositionSnapshot, PriceSnapshot,
};

/// Price/liquidity oracle feed
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest(&self) -> Result<Vec<PriceSnapshot>, FeedError>;
}

/// Mempool feed supplying pending and recently mined transaction windows
#[async_trait]
pub trait PendingTxSource: Send + Sync {
    async fn pending_window(&self) -> Result<Vec<PendingTransaction>, FeedError>;

    async fn recent_window(&self) -> Result<Vec<PendingTransaction>, FeedError>;
}

/// External position ledger
#[async_trait]
pub trait PositionLedger: Send + Sync {
    async fn positions(&self) -> Result<Vec<PositionSnapshot>, FeedError>;

    async fn portfolio(&self) -> Result<PortfolioInputs, FeedError>;
}

const SWAP_SELECTORS: [&str; 3] = ["0x38ed1739", "0x7ff36ab5", "0x18cbafe5"];
const POOLS: [&str; 4] = [
    "0xa478c2975ab1ea89e8196811f51a7b7ade33eb11",
    "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
    "0x0d4a11d5eeaac28ec3f61d100daf4d40471f1852",
    "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640",
];

/// Self-contained feed producing plausible data so the monitor runs
/// end-to-end without any external services.
pub struct SimulatedFeed {
    seq: Mutex<u64>,
}

impl SimulatedFeed {
    pub fn new() -> Self {
        Self { seq: Mutex::new(0) }
    }

    async fn next_seq(&self) -> u64 {
        let mut seq = self.seq.lock().await;
        *seq += 1;
        *seq
    }

    fn random_tx(base_gas: f64, pool: &str) -> PendingTransaction {
        let mut rng = rand::thread_rng();
        let selector = SWAP_SELECTORS[rng.gen_range(0..SWAP_SELECTORS.len())];
        PendingTransaction {
            hash: format!("0x{:064x}", rng.gen::<u64>()),
            gas_price: base_gas * rng.gen_range(0.6..2.2),
            to: pool.to_string(),
            input_data: format!("{}{:056x}", selector, rng.gen::<u64>()),
            timestamp: Utc::now(),
        }
    }
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceFeed for SimulatedFeed {
    async fn latest(&self) -> Result<Vec<PriceSnapshot>, FeedError> {
        let mut rng = rand::thread_rng();
        Ok(POOLS
            .iter()
            .map(|pool| PriceSnapshot {
                token: "WETH/USDC".to_string(),
                dex: pool.to_string(),
                price: 3000.0 * rng.gen_range(0.99..1.01),
                liquidity: rng.gen_range(1e5..1e7),
                volume_24h: rng.gen_range(1e5..1e8),
                timestamp: Utc::now(),
            })
            .collect())
    }
}

#[async_trait]
impl PendingTxSource for SimulatedFeed {
    async fn pending_window(&self) -> Result<Vec<PendingTransaction>, FeedError> {
        let mut rng = rand::thread_rng();
        let count = rng.gen_range(3..12);
        Ok((0..count)
            .map(|_| {
                let pool = POOLS[rng.gen_range(0..POOLS.len())];
                Self::random_tx(30.0, pool)
            })
            .collect())
    }

    async fn recent_window(&self) -> Result<Vec<PendingTransaction>, FeedError> {
        let seq = self.next_seq().await;
        let mut rng = rand::thread_rng();
        let mut window: Vec<PendingTransaction> = (0..8)
            .map(|_| {
                let pool = POOLS[rng.gen_range(0..POOLS.len())];
                Self::random_tx(30.0, pool)
            })
            .collect();
        // Periodically plant a sandwich-shaped triple so detection paths
        // get exercised in dry runs
        if seq % 5 == 0 {
            let pool = POOLS[0];
            window.push(Self::random_tx(60.0, pool));
            window.push(Self::random_tx(18.0, pool));
            window.push(Self::random_tx(65.0, pool));
        }
        Ok(window)
    }
}

#[async_trait]
impl PositionLedger for SimulatedFeed {
    async fn positions(&self) -> Result<Vec<PositionSnapshot>, FeedError> {
        let mut rng = rand::thread_rng();
        Ok((0..4)
            .map(|i| PositionSnapshot {
                position_id: format!("pos-{}", i),
                asset_pair: "WETH/USDC".to_string(),
                size: rng.gen_range(1_000.0..50_000.0),
                pnl: rng.gen_range(-2_000.0..2_000.0),
            })
            .collect())
    }

    async fn portfolio(&self) -> Result<PortfolioInputs, FeedError> {
        let mut rng = rand::thread_rng();
        Ok(PortfolioInputs {
            portfolio_value: rng.gen_range(80_000.0..120_000.0),
            daily_pnl: rng.gen_range(-1_500.0..1_500.0),
            leverage_ratio: rng.gen_range(1.0..4.0),
            liquidity_ratio: rng.gen_range(0.05..0.6),
            diversification_score: rng.gen_range(0.1..0.9),
            correlation_risk: rng.gen_range(0.1..0.9),
            gas_price_gwei: rng.gen_range(10.0..200.0),
            network_congestion: rng.gen_range(0.1..1.0),
            market_volatility: rng.gen_range(0.05..0.9),
        })
    }
}
