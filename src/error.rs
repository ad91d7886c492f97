//! Error types for the Caro room client.

use thiserror::Error;

/// Errors that can occur when using the Caro room client.
#[derive(Debug, Error)]
pub enum CaroError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open channel, but the channel is closed.
    #[error("not connected to server")]
    NotConnected,

    /// The server deleted the room this connection was joined to.
    #[error("room {room_code} was deleted")]
    Terminated {
        /// Code of the deleted room.
        room_code: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP collaborator answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Http {
        /// Response status code.
        status: u16,
        /// What the request was trying to do.
        message: String,
    },

    /// An HTTP request could not be sent or its body could not be read.
    #[error("request error: {0}")]
    Request(String),

    /// A player name was empty after trimming.
    #[error("player name must not be empty")]
    InvalidName,

    /// A room code was empty after trimming.
    #[error("room code must not be empty")]
    InvalidRoomCode,

    /// A room was requested before a local identity exists.
    #[error("an identity is required before joining a room")]
    IdentityRequired,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A specialized [`Result`] type for Caro room client operations.
pub type Result<T> = std::result::Result<T, CaroError>;
