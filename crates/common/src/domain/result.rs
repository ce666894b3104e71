use crate::domain::ClientId;
use std::time::Duration;
use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Reasons an inbound broker message is rejected before scoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Malformed topic '{topic}': {reason}")]
    MalformedTopic { topic: String, reason: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Persistence gateway failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

/// Failure to deliver one live message to one client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastDeliveryError {
    #[error("Client {0} disconnected")]
    Disconnected(ClientId),

    #[error("Client {0} is not accepting messages")]
    QueueFull(ClientId),

    #[error("Failed to serialize live message: {0}")]
    Serialization(String),
}

/// Broker subscriber failures
#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("Invalid broker configuration: {0}")]
    InvalidBrokerConfig(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Gave up after {0} reconnect attempts")]
    RetriesExhausted(u32),

    #[error("Pipeline queue closed")]
    QueueClosed,
}
