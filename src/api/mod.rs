// Venue access: capability traits plus the OANDA v20 implementation
pub mod oanda;

pub use oanda::OandaClient;

use crate::error::Result;
use crate::models::{Bar, BracketOrder, Granularity, OpenTrade, Position};

/// Candle/bar queries
#[allow(async_fn_in_trait)]
pub trait MarketDataSource {
    /// Up to `count` most recent bars, including a still-forming final bar if the venue sends one
    async fn fetch_bars(
        &self,
        instrument: &str,
        count: usize,
        granularity: Granularity,
    ) -> Result<Vec<Bar>>;
}

/// Open exposure queries for the configured account
#[allow(async_fn_in_trait)]
pub trait AccountStateReader {
    /// Empty when the account is flat
    async fn list_open_positions(&self) -> Result<Vec<Position>>;

    async fn list_open_trades(&self) -> Result<Vec<OpenTrade>>;
}

/// Order submission
#[allow(async_fn_in_trait)]
pub trait OrderGateway {
    /// Submit once and hand back the venue's raw response body
    ///
    /// Implementations must not retry: a repeated submission after an
    /// ambiguous response could open a second position.
    async fn submit_market_order(&self, order: &BracketOrder) -> Result<serde_json::Value>;
}
