//! Error types for the log manager

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// No connection could be established to a sink endpoint
    #[error("Failed to connect to {target}: {message}")]
    ConnectError { target: String, message: String },

    /// The writer registry was already installed
    #[error("Custom writers have already been installed")]
    RegistryInstalled,

    /// Writer already closed
    #[error("Writer already closed")]
    WriterClosed,

    /// Remote delivery failed
    #[error("Delivery failed: {0}")]
    DeliveryError(String),

    /// A panic was caught at a recovery boundary
    #[error("{0}")]
    Panicked(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a connection error for the given target
    pub fn connect(target: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::ConnectError {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery<S: Into<String>>(msg: S) -> Self {
        LoggerError::DeliveryError(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }
}
