//! Common types used across the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price and liquidity snapshot from an external oracle feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub token: String,
    pub dex: String,
    pub price: f64,
    pub liquidity: f64,
    pub volume_24h: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pending transaction record from the mempool feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
    /// Gas price in gwei
    pub gas_price: f64,
    pub to: String,
    pub input_data: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingTransaction {
    /// First 4 bytes of calldata as a hex selector ("0x" + 8 hex chars)
    pub fn selector(&self) -> Option<&str> {
        if self.input_data.len() >= 10 && self.input_data.starts_with("0x") {
            Some(&self.input_data[..10])
        } else {
            None
        }
    }
}

/// Open position snapshot from the external position ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub position_id: String,
    pub asset_pair: String,
    pub size: f64,
    pub pnl: f64,
}

/// Portfolio-level inputs from the external position ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioInputs {
    pub portfolio_value: f64,
    pub daily_pnl: f64,
    pub leverage_ratio: f64,
    pub liquidity_ratio: f64,
    pub diversification_score: f64,
    pub correlation_risk: f64,
    pub gas_price_gwei: f64,
    pub network_congestion: f64,
    pub market_volatility: f64,
}

impl Default for PortfolioInputs {
    fn default() -> Self {
        Self {
            portfolio_value: 0.0,
            daily_pnl: 0.0,
            leverage_ratio: 1.0,
            liquidity_ratio: 0.0,
            diversification_score: 0.0,
            correlation_risk: 0.0,
            gas_price_gwei: 0.0,
            network_congestion: 0.0,
            market_volatility: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_extraction() {
        let tx = PendingTransaction {
            hash: "0xabc".to_string(),
            gas_price: 30.0,
            to: "0xpool".to_string(),
            input_data: "0x38ed173900000000".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(tx.selector(), Some("0x38ed1739"));
    }

    #[test]
    fn test_selector_missing_for_short_calldata() {
        let tx = PendingTransaction {
            hash: "0xabc".to_string(),
            gas_price: 30.0,
            to: "0xpool".to_string(),
            input_data: "0x".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(tx.selector(), None);
    }
}
