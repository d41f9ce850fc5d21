use thiserror::Error;

/// Persistence collaborator failures. Initialization failure is reported to
/// the caller as a typed error with recovery left to the store
/// implementation; the engine never aborts the process over it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Engine error taxonomy. Transport and auth failures surface on the event
/// bus as connection state; these are the errors the intent API and the
/// frame handlers return. Malformed input is logged and dropped at the call
/// site, never fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("API key is malformed")]
    InvalidApiKey,
    #[error("not a valid session identifier: {0:?}")]
    InvalidSessionId(String),
    #[error("unable to connect after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("engine task is gone")]
    EngineGone,
}
