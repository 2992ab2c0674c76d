// Engine error taxonomy - nothing here is fatal; every variant degrades to last known good state
use thiserror::Error;

use super::cluster::ClusterId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} failed: {reason}")]
    TransientFetch {
        operation: &'static str,
        reason: String,
    },

    #[error("no station satisfies the routing eligibility rules")]
    NoEligibleCandidate,

    #[error("cluster {0} is unknown or belongs to a replaced index")]
    StaleClusterReference(ClusterId),

    #[error("station {0} is not in the current snapshot")]
    UnknownStation(String),

    #[error("no service center is available for dispatch")]
    NoServiceCenter,
}

impl EngineError {
    pub fn transient(operation: &'static str, err: &anyhow::Error) -> Self {
        EngineError::TransientFetch {
            operation,
            reason: format!("{:#}", err),
        }
    }
}
