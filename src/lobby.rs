//! Landing-page flow: room codes, routes and the identity gate.
//!
//! A room route opened without an identity is redirected to the landing page
//! and remembered as the pending target. Once the player registers a name,
//! both "create" and "join" resume that target instead of their normal action.

use std::fmt;

use tracing::{debug, info};

use crate::api::GameApi;
use crate::error::{CaroError, Result};
use crate::identity::IdentityStore;
use crate::protocol::Identity;

const ROOM_PATH_PREFIX: &str = "/room/";

/// Trim and uppercase a room code.
///
/// # Errors
///
/// Returns [`CaroError::InvalidRoomCode`] if nothing is left after trimming.
pub fn normalize_room_code(raw: &str) -> Result<String> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(CaroError::InvalidRoomCode);
    }
    Ok(code.to_uppercase())
}

/// Navigable screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Room(String),
}

impl Route {
    /// Parse a location path. `/room/<code>` is a room; anything else lands.
    pub fn parse(path: &str) -> Self {
        let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
        path.strip_prefix(ROOM_PATH_PREFIX)
            .map(|rest| rest.trim_end_matches('/'))
            .and_then(|code| normalize_room_code(code).ok())
            .map_or(Self::Landing, Self::Room)
    }

    pub fn path(&self) -> String {
        match self {
            Self::Landing => "/".to_string(),
            Self::Room(code) => format!("{ROOM_PATH_PREFIX}{code}"),
        }
    }

    pub fn room_code(&self) -> Option<&str> {
        match self {
            Self::Landing => None,
            Self::Room(code) => Some(code),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Extract the `room` parameter of a query string (`?room=abc` → `ABC`).
pub fn deep_link_room(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "room")
        .and_then(|(_, value)| normalize_room_code(value).ok())
}

/// Shareable link to a room.
pub fn invite_link(base_url: &str, room_code: &str) -> String {
    format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        Route::Room(room_code.to_string()).path()
    )
}

/// Landing-page state: the room the player was heading to, if any.
#[derive(Debug, Default, Clone)]
pub struct Lobby {
    pending: Option<String>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// A landing page opened with a query string such as `?room=abc123`.
    pub fn from_query(query: &str) -> Self {
        Self {
            pending: deep_link_room(query),
        }
    }

    pub fn pending_target(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Gate a navigation on identity. Room routes without an identity land
    /// instead and are kept as the pending target.
    pub fn guard(&mut self, route: Route, identity: Option<&Identity>) -> Route {
        match (route, identity) {
            (Route::Room(code), None) => {
                debug!(room = %code, "no identity, redirecting to landing");
                self.pending = Some(code);
                Route::Landing
            }
            (route, _) => route,
        }
    }

    /// Jump straight to the pending target when an identity already exists.
    pub fn resume(&mut self, identity: Option<&Identity>) -> Option<Route> {
        identity?;
        self.pending.take().map(Route::Room)
    }

    /// "Create room": ensure an identity, then resume the pending target or
    /// allocate a new room.
    ///
    /// # Errors
    ///
    /// Registration and room creation errors propagate. The pending target
    /// survives a failure.
    pub async fn create_room<A: GameApi + ?Sized>(
        &mut self,
        identities: &mut IdentityStore,
        api: &A,
        name: &str,
    ) -> Result<Route> {
        let identity = identities.ensure(name, api).await?;
        if let Some(route) = self.resume(Some(&identity)) {
            return Ok(route);
        }
        let code = normalize_room_code(&api.create_room().await?)?;
        info!(room = %code, player = %identity.id, "room created");
        Ok(Route::Room(code))
    }

    /// "Join room": ensure an identity, then resume the pending target or
    /// enter `code`.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::InvalidRoomCode`] for a blank code, and
    /// propagates registration errors.
    pub async fn join_room<A: GameApi + ?Sized>(
        &mut self,
        identities: &mut IdentityStore,
        api: &A,
        name: &str,
        code: &str,
    ) -> Result<Route> {
        let identity = identities.ensure(name, api).await?;
        if let Some(route) = self.resume(Some(&identity)) {
            return Ok(route);
        }
        Ok(Route::Room(normalize_room_code(code)?))
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
    use crate::api::HistoryRecord;
    use crate::identity::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedApi;

    #[async_trait]
    impl GameApi for FixedApi {
        async fn create_identity(&self, name: &str) -> Result<Identity> {
            Ok(Identity::new("u1", name))
        }

        async fn create_room(&self) -> Result<String> {
            Ok("new001".into())
        }

        async fn fetch_history(&self, _: &str, _: &str) -> Result<HistoryRecord> {
            Err(CaroError::NotConnected)
        }
    }

    fn empty_identities() -> IdentityStore {
        IdentityStore::load(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_room_code("  abc12 ").unwrap(), "ABC12");
        assert!(matches!(
            normalize_room_code(" \t"),
            Err(CaroError::InvalidRoomCode)
        ));
    }

    #[test]
    fn route_parsing() {
        assert_eq!(Route::parse("/room/zbav6o"), Route::Room("ZBAV6O".into()));
        assert_eq!(Route::parse("/room/ab1/?x=1"), Route::Room("AB1".into()));
        assert_eq!(Route::parse("/room/"), Route::Landing);
        assert_eq!(Route::parse("/"), Route::Landing);
        assert_eq!(Route::Room("AB1".into()).path(), "/room/AB1");
    }

    #[test]
    fn deep_link_query() {
        assert_eq!(deep_link_room("?room=zbav6o").as_deref(), Some("ZBAV6O"));
        assert_eq!(deep_link_room("a=1&room=x1").as_deref(), Some("X1"));
        assert_eq!(deep_link_room("?room="), None);
        assert_eq!(deep_link_room(""), None);
    }

    #[test]
    fn invite_link_uses_room_path() {
        assert_eq!(
            invite_link("https://caro.example/", "AB1"),
            "https://caro.example/room/AB1"
        );
    }

    #[test]
    fn guard_redirects_and_remembers_target() {
        let mut lobby = Lobby::new();
        let route = lobby.guard(Route::Room("AB1".into()), None);
        assert_eq!(route, Route::Landing);
        assert_eq!(lobby.pending_target(), Some("AB1"));

        let me = Identity::new("u1", "Ann");
        assert_eq!(
            lobby.guard(Route::Room("CD2".into()), Some(&me)),
            Route::Room("CD2".into())
        );
        assert_eq!(lobby.resume(None), None);
        assert_eq!(lobby.resume(Some(&me)), Some(Route::Room("AB1".into())));
        assert_eq!(lobby.pending_target(), None);
    }

    #[tokio::test]
    async fn create_resumes_pending_target() {
        let mut lobby = Lobby::from_query("?room=ab1");
        let mut identities = empty_identities();
        let route = lobby
            .create_room(&mut identities, &FixedApi, "Ann")
            .await
            .unwrap();
        assert_eq!(route, Route::Room("AB1".into()));
        assert!(identities.current().is_some());
    }

    #[tokio::test]
    async fn create_allocates_room_without_target() {
        let mut lobby = Lobby::new();
        let mut identities = empty_identities();
        let route = lobby
            .create_room(&mut identities, &FixedApi, "Ann")
            .await
            .unwrap();
        assert_eq!(route, Route::Room("NEW001".into()));
    }

    #[tokio::test]
    async fn join_requires_name_and_code() {
        let mut lobby = Lobby::new();
        let mut identities = empty_identities();

        let err = lobby
            .join_room(&mut identities, &FixedApi, " ", "AB1")
            .await
            .unwrap_err();
        assert!(matches!(err, CaroError::InvalidName));

        let err = lobby
            .join_room(&mut identities, &FixedApi, "Ann", "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, CaroError::InvalidRoomCode));

        let route = lobby
            .join_room(&mut identities, &FixedApi, "Ann", " ab1 ")
            .await
            .unwrap();
        assert_eq!(route, Route::Room("AB1".into()));
    }

    #[tokio::test]
    async fn failed_registration_keeps_pending_target() {
        let mut lobby = Lobby::from_query("room=ab1");
        let mut identities = empty_identities();
        assert!(lobby
            .create_room(&mut identities, &FixedApi, "")
            .await
            .is_err());
        assert_eq!(lobby.pending_target(), Some("AB1"));
    }
}
