//! Transport abstraction for the Caro room channel.
//!
//! The [`Transport`] trait defines one connected, bidirectional text message
//! channel. The room protocol uses JSON text messages, so every transport
//! implementation must handle message framing internally (e.g., WebSocket
//! frames, length-prefixed TCP).
//!
//! A [`Connector`] produces fresh transports. The room connection asks it for a
//! new transport after every drop, which is how the channel reconnects: the
//! server keeps no session across network changes, so each new transport is
//! followed by a fresh `join-room`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use caro_room_client::error::CaroError;
//! use caro_room_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), CaroError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, CaroError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), CaroError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self) -> Result<MyTransport, CaroError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CaroError;

/// A bidirectional text message transport for the room channel.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), CaroError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, CaroError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), CaroError>;
}

/// Establishes new [`Transport`]s for the same server endpoint.
///
/// Called once when a room connection opens and again for every reconnect
/// attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Open a new connected transport.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt; the room connection backs off
    /// and tries again.
    async fn connect(&mut self) -> Result<Self::Transport, CaroError>;
}
