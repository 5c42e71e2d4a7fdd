use std::fmt;
use thiserror::Error;

/// Failures the trading loop can run into
///
/// The first six kinds are transient: the controller logs them and retries
/// on the next tick. `InvalidConfig` only occurs at startup and `FaultLimit`
/// is raised by the controller itself when the consecutive-failure limit is hit.
#[derive(Debug, Error)]
pub enum TraderError {
    #[error("data unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    #[error("account query failed: {0}")]
    QueryFailure(String),

    #[error("stage '{stage}' failed: {reason}")]
    ComputationFailure { stage: String, reason: String },

    #[error("order rejected by venue: {0}")]
    OrderRejected(String),

    #[error("order response not recognised: {0}")]
    OrderAmbiguous(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("giving up after {count} consecutive failures (last: {last})")]
    FaultLimit { count: u32, last: String },
}

/// Flat classification of [`TraderError`], used as a log field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    DataUnavailable,
    QueryFailure,
    ComputationFailure,
    OrderRejected,
    OrderAmbiguous,
    TransportFailure,
    InvalidConfig,
    FaultLimit,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::DataUnavailable => "DataUnavailable",
            FaultKind::QueryFailure => "QueryFailure",
            FaultKind::ComputationFailure => "ComputationFailure",
            FaultKind::OrderRejected => "OrderRejected",
            FaultKind::OrderAmbiguous => "OrderAmbiguous",
            FaultKind::TransportFailure => "TransportFailure",
            FaultKind::InvalidConfig => "InvalidConfig",
            FaultKind::FaultLimit => "FaultLimit",
        };
        f.write_str(name)
    }
}

impl TraderError {
    pub fn kind(&self) -> FaultKind {
        match self {
            TraderError::DataUnavailable { .. } => FaultKind::DataUnavailable,
            TraderError::QueryFailure(_) => FaultKind::QueryFailure,
            TraderError::ComputationFailure { .. } => FaultKind::ComputationFailure,
            TraderError::OrderRejected(_) => FaultKind::OrderRejected,
            TraderError::OrderAmbiguous(_) => FaultKind::OrderAmbiguous,
            TraderError::Transport(_) => FaultKind::TransportFailure,
            TraderError::InvalidConfig(_) => FaultKind::InvalidConfig,
            TraderError::FaultLimit { .. } => FaultKind::FaultLimit,
        }
    }

    /// Whether the controller should log and retry on the next tick
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            TraderError::InvalidConfig(_) | TraderError::FaultLimit { .. }
        )
    }

    pub fn data_unavailable(instrument: &str, reason: impl Into<String>) -> Self {
        TraderError::DataUnavailable {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn computation(stage: &str, reason: impl Into<String>) -> Self {
        TraderError::ComputationFailure {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for TraderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TraderError::Transport(format!("request timed out: {}", err))
        } else {
            TraderError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TraderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TraderError::QueryFailure("x".into()).is_transient());
        assert!(TraderError::OrderAmbiguous("{}".into()).is_transient());
        assert!(TraderError::data_unavailable("EUR_USD", "5 bars").is_transient());
        assert!(!TraderError::InvalidConfig("x".into()).is_transient());
        assert!(!TraderError::FaultLimit {
            count: 3,
            last: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn test_kind_and_message() {
        let err = TraderError::computation("adx", "period is zero");
        assert_eq!(err.kind(), FaultKind::ComputationFailure);
        assert_eq!(err.to_string(), "stage 'adx' failed: period is zero");
        assert_eq!(
            TraderError::Transport("reset".into()).kind().to_string(),
            "TransportFailure"
        );
    }
}
