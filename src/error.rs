//! Crate-level error types.
//!
//! [`KlineError`] unifies every error source (configuration, HTTP,
//! WebSocket, JSON) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation.
//!
//! Most of these never cross the engine boundary: the history fetcher
//! turns transport failures into an empty result and the live merger
//! drops bad ticks. They surface from the datafeed adapters, from
//! configuration loading, and from a [`ChartHandle`](crate::session::ChartHandle)
//! whose session task has gone away.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KlineError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum KlineError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP request to the history API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A period label or multiplier could not be interpreted.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// The chart session task has stopped and can no longer take commands.
    #[error("chart session closed")]
    SessionClosed,
}
