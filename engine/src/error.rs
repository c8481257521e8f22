use biogate_vecstore::{IdentityId, VecError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine: index error: {0}")]
    Index(#[from] VecError),

    #[error("engine: identity store error: {0}")]
    Identity(String),

    #[error("engine: identity {0} already exists")]
    IdentityExists(IdentityId),

    #[error("engine: identity {0} not found")]
    IdentityNotFound(IdentityId),

    #[error("engine: removal of identity {id} failed: {reason}")]
    RemovalFailed { id: IdentityId, reason: String },

    #[error("engine: serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
