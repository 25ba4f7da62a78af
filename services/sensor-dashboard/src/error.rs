//! Error types for the dashboard session

/// Errors that can occur while running a dashboard session
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Backend configuration not found or empty")]
    MissingConfiguration,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Not connected to backend gateway")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Failed to receive response")]
    ReceiveError,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;
