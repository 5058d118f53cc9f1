use wirestore_api::StoreError;
use wirestore_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("database: {0}")]
    Database(#[from] StoreError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
