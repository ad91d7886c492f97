//! REST endpoints for identities, room creation and head-to-head history.
//!
//! [`GameApi`] is the seam the lobby, identity store and history tracker call
//! through. [`ApiClient`] implements it over HTTP with `reqwest` (behind the
//! `http-api` feature); tests substitute in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::Identity;

/// Body of `GET /api/history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub me: String,
    pub opponent: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total: u32,
}

/// Body of `POST /api/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Server-side operations outside the room channel.
#[async_trait]
pub trait GameApi: Send + Sync + 'static {
    /// `POST /api/users`: register a display name and receive an identity.
    async fn create_identity(&self, name: &str) -> Result<Identity>;

    /// `POST /api/rooms`: allocate a new room code.
    async fn create_room(&self) -> Result<String>;

    /// `GET /api/history`: aggregate results between two identities.
    async fn fetch_history(&self, user_id: &str, opponent_id: &str) -> Result<HistoryRecord>;
}

#[cfg(feature = "http-api")]
pub use http::ApiClient;

#[cfg(feature = "http-api")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tracing::debug;

    use super::{CreatedRoom, GameApi, HistoryRecord};
    use crate::error::{CaroError, Result};
    use crate::protocol::Identity;

    const CONNECT_TIMEOUT_SECS: u64 = 5;

    #[derive(Serialize)]
    struct CreateUser<'a> {
        name: &'a str,
    }

    /// HTTP client for the game server's REST API.
    #[derive(Debug, Clone)]
    pub struct ApiClient {
        http: reqwest::Client,
        base_url: String,
    }

    impl ApiClient {
        /// Build a client rooted at `base_url`. Every request is bounded by `timeout`.
        ///
        /// # Errors
        ///
        /// Returns [`CaroError::Config`] if the HTTP client cannot be built.
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
            let base_url = base_url.trim().trim_end_matches('/').to_string();
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
                .build()
                .map_err(|e| CaroError::Config(e.to_string()))?;
            Ok(Self { http, base_url })
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        async fn read_json<T: DeserializeOwned>(
            response: reqwest::Response,
            what: &str,
        ) -> Result<T> {
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                debug!(status = status.as_u16(), %body, "{what} rejected");
                return Err(CaroError::Http {
                    status: status.as_u16(),
                    message: format!("{what} failed"),
                });
            }
            let text = response
                .text()
                .await
                .map_err(|e| CaroError::Request(e.to_string()))?;
            Ok(serde_json::from_str(&text)?)
        }
    }

    #[async_trait]
    impl GameApi for ApiClient {
        async fn create_identity(&self, name: &str) -> Result<Identity> {
            let response = self
                .http
                .post(self.url("/api/users"))
                .json(&CreateUser { name })
                .send()
                .await
                .map_err(|e| CaroError::Request(e.to_string()))?;
            Self::read_json(response, "create user").await
        }

        async fn create_room(&self) -> Result<String> {
            let response = self
                .http
                .post(self.url("/api/rooms"))
                .send()
                .await
                .map_err(|e| CaroError::Request(e.to_string()))?;
            let created: CreatedRoom = Self::read_json(response, "create room").await?;
            Ok(created.room_id)
        }

        async fn fetch_history(&self, user_id: &str, opponent_id: &str) -> Result<HistoryRecord> {
            let response = self
                .http
                .get(self.url("/api/history"))
                .query(&[("userId", user_id), ("opponentId", opponent_id)])
                .send()
                .await
                .map_err(|e| CaroError::Request(e.to_string()))?;
            Self::read_json(response, "fetch history").await
        }
    }

    #[cfg(test)]
    #[allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )]
    mod tests {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        /// Serve one canned HTTP response and report the request line.
        async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
                let _ = tx.send(request.lines().next().unwrap_or_default().to_string());
            });
            (format!("http://{addr}"), rx)
        }

        #[test]
        fn base_url_is_trimmed() {
            let client = ApiClient::new(" http://localhost:3000/ ", Duration::from_secs(1)).unwrap();
            assert_eq!(client.base_url(), "http://localhost:3000");
            assert_eq!(client.url("/api/rooms"), "http://localhost:3000/api/rooms");
        }

        #[tokio::test]
        async fn fetch_history_sends_query_and_parses_body() {
            let (url, request_line) = serve_once(
                "200 OK",
                r#"{"me":"u1","opponent":"u2","wins":3,"losses":1,"draws":2,"total":6}"#,
            )
            .await;
            let client = ApiClient::new(&url, Duration::from_secs(5)).unwrap();

            let record = client.fetch_history("u1", "u2").await.unwrap();
            assert_eq!(record.wins, 3);
            assert_eq!(record.total, 6);

            let line = request_line.await.unwrap();
            assert!(line.starts_with("GET /api/history?userId=u1&opponentId=u2 "));
        }

        #[tokio::test]
        async fn non_success_maps_to_http_error() {
            let (url, _request_line) = serve_once("500 Internal Server Error", "{}").await;
            let client = ApiClient::new(&url, Duration::from_secs(5)).unwrap();

            let err = client.fetch_history("u1", "u2").await.unwrap_err();
            assert!(matches!(err, CaroError::Http { status: 500, .. }));
        }

        #[tokio::test]
        async fn unreachable_server_is_request_error() {
            let client = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
            let err = client.create_room().await.unwrap_err();
            assert!(matches!(err, CaroError::Request(_)));
        }
    }
}
