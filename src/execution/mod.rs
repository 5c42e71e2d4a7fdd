// Execution loop: controller state machine, bar preparation and order submission
pub mod account;
pub mod controller;
pub mod market_data;
pub mod order_service;
pub mod state;

pub use account::{classify_exposure, Exposure};
pub use controller::{Controller, TickOutcome};
pub use market_data::{normalize_bars, prepare_series};
pub use order_service::{bracket_levels, classify_order_response, OrderExecutionService};
pub use state::{ControllerState, Phase};

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TraderError};

/// Bound a venue call; an elapsed limit becomes a transport failure
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TraderError::Transport(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}
