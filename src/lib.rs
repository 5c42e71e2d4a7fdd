// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod logging;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::{AccountStateReader, MarketDataSource, OandaClient, OrderGateway};
pub use config::{ControllerSettings, StrategyConfig, TraderConfig, VenueSettings};
pub use error::{FaultKind, Result, TraderError};
pub use execution::{Controller, Phase, TickOutcome};
pub use models::*;
pub use strategy::Pipeline;
