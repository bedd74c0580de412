use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error(transparent)]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error(transparent)]
    DataBroker(#[from] atlas_broker::DataBrokerError),

    #[error("event queue full, dropping {kind}")]
    QueueFull { kind: &'static str },
}
