//! Session ownership: login, logout, restore and access queries

mod session;
mod storage;

use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::{error_message, Fetch};

pub use session::*;
pub use storage::*;

/// Session mutations, broadcast to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login succeeded
    SignedIn,
    /// The session was cleared by `logout`
    SignedOut,
    /// A persisted session was loaded at startup
    Restored,
    /// Persisted state was corrupt and has been wiped
    Cleared,
}

#[derive(Serialize)]
struct LoginCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// Single source of truth for who is logged in and with which roles.
///
/// Cloning is cheap; clones share the same session and subscribers.
#[derive(Clone)]
pub struct SessionStore {
    api_url: String,
    client: Client,
    options: ClientOptions,
    storage: Arc<dyn TokenStorage>,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store talking to `api_url` (e.g. `http://localhost:8000/api/v1`)
    pub fn new(
        api_url: &str,
        client: Client,
        options: ClientOptions,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
            options,
            storage,
            session: Arc::new(RwLock::new(None)),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, event: SessionEvent) {
        // No receivers is fine.
        if self.events.send(event).is_err() {
            log::trace!("No subscribers for {:?}", event);
        }
    }

    /// Log in with username and password.
    ///
    /// On success the token pair is persisted (when `persist_session` is
    /// set) and becomes the current session. On failure nothing changes,
    /// including any session that was already present.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, Error> {
        let url = format!("{}/users/login/", self.api_url);

        let response = Fetch::post(&self.client, &url)
            .timeout(self.options.request_timeout)
            .json(&LoginCredentials { username, password })?
            .execute_raw()
            .await
            .map_err(|err| Error::auth(format!("Login request failed: {}", err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Error::auth(format!("Login response unreadable: {}", err)))?;

        if !status.is_success() {
            log::warn!("Login rejected with status {}", status);
            return Err(Error::auth(error_message(&body)));
        }

        let tokens: TokenPair = serde_json::from_str(&body)
            .map_err(|err| Error::auth(format!("Unexpected login response: {}", err)))?;
        let session = Session::from_tokens(tokens)?;

        if self.options.persist_session {
            let raw = serde_json::to_string(&session.tokens)?;
            self.storage.save(&raw).await?;
        }

        *self.write() = Some(session.clone());
        log::info!(
            "Signed in as {}",
            session.claims.username.as_deref().unwrap_or("<unknown>")
        );
        self.notify(SessionEvent::SignedIn);

        Ok(session)
    }

    /// Forget the session, in memory and on disk. Safe to call repeatedly.
    ///
    /// The in-memory session is gone and `SignedOut` is sent even when
    /// clearing storage fails; the storage error is returned afterwards.
    pub async fn logout(&self) -> Result<(), Error> {
        *self.write() = None;
        let cleared = self.storage.clear().await;
        log::info!("Signed out");
        self.notify(SessionEvent::SignedOut);
        cleared
    }

    /// Load the persisted session, once at startup.
    ///
    /// A value that does not parse, or whose access token does not
    /// decode, is wiped and the store stays logged out. Only storage I/O
    /// failures are returned as errors.
    pub async fn restore(&self) -> Result<Option<Session>, Error> {
        let raw = match self.storage.load().await? {
            Some(raw) => raw,
            None => {
                log::debug!("No persisted session");
                return Ok(None);
            }
        };

        let restored = serde_json::from_str::<TokenPair>(&raw)
            .map_err(Error::from)
            .and_then(Session::from_tokens);

        match restored {
            Ok(session) => {
                *self.write() = Some(session.clone());
                log::info!("Restored persisted session");
                self.notify(SessionEvent::Restored);
                Ok(Some(session))
            }
            Err(err) => {
                log::warn!("Discarding corrupt persisted session: {}", err);
                *self.write() = None;
                let cleared = self.storage.clear().await;
                self.notify(SessionEvent::Cleared);
                cleared?;
                Ok(None)
            }
        }
    }

    /// Whether a session exists and its access token has not expired.
    ///
    /// Re-evaluated on every call.
    pub fn is_live(&self) -> bool {
        self.read().as_ref().map_or(false, Session::is_live)
    }

    /// Whether the session holds at least one of `required`.
    ///
    /// Callers express "no role needed" by not calling this; an empty
    /// `required` always answers `false`.
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        if required.is_empty() {
            log::debug!("has_any_role called with no roles");
            return false;
        }
        self.read()
            .as_ref()
            .map_or(false, |session| session.has_any_role(required))
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Option<Session> {
        self.read().clone()
    }

    /// Claims of the current session
    pub fn claims(&self) -> Option<Claims> {
        self.read().as_ref().map(|s| s.claims.clone())
    }

    /// Bearer token of the current session
    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.tokens.access.clone())
    }

    /// Receive an event for every session mutation
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Base URL of the API
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Options the store was created with
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::session::test_tokens::token_with;
    use super::*;

    fn store_with(storage: Arc<dyn TokenStorage>) -> SessionStore {
        SessionStore::new(
            "http://localhost:8000/api/v1/",
            Client::new(),
            ClientOptions::default(),
            storage,
        )
    }

    fn pair(access: String) -> String {
        serde_json::to_string(&TokenPair {
            access,
            refresh: Some("refresh".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = store_with(Arc::new(MemoryStorage::new()));
        assert_eq!(store.api_url(), "http://localhost:8000/api/v1");
    }

    #[test]
    fn empty_store_answers_false() {
        let store = store_with(Arc::new(MemoryStorage::new()));
        assert!(!store.is_live());
        assert!(!store.has_any_role(&["Broker"]));
        assert!(store.access_token().is_none());
    }

    #[tokio::test]
    async fn restore_loads_persisted_pair() {
        let storage = Arc::new(MemoryStorage::with_value(&pair(token_with(300, &["Manager"]))));
        let store = store_with(storage);
        let mut events = store.subscribe();

        let session = store.restore().await.unwrap().expect("restored");
        assert_eq!(session.tokens.refresh.as_deref(), Some("refresh"));
        assert!(store.is_live());
        assert!(store.has_any_role(&["Manager", "Auditor"]));
        assert!(!store.has_any_role(&["Admin"]));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Restored);
    }

    #[tokio::test]
    async fn restore_with_expired_token_is_not_live() {
        let storage = Arc::new(MemoryStorage::with_value(&pair(token_with(-60, &["Admin"]))));
        let store = store_with(storage.clone());

        assert!(store.restore().await.unwrap().is_some());
        assert!(!store.is_live());
        // Stale sessions are detected lazily, not purged.
        assert!(storage.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_storage_is_cleared() {
        for raw in ["not json", r#"{"access":"garbage"}"#, r#"{"refresh":"x"}"#] {
            let storage = Arc::new(MemoryStorage::with_value(raw));
            let store = store_with(storage.clone());
            let mut events = store.subscribe();

            assert!(store.restore().await.unwrap().is_none());
            assert!(!store.is_live());
            assert_eq!(storage.load().await.unwrap(), None);
            assert_eq!(events.recv().await.unwrap(), SessionEvent::Cleared);
        }
    }

    #[tokio::test]
    async fn logout_then_restore_is_not_live() {
        let storage = Arc::new(MemoryStorage::with_value(&pair(token_with(300, &["Broker"]))));
        let store = store_with(storage.clone());
        store.restore().await.unwrap();
        assert!(store.is_live());

        store.logout().await.unwrap();
        store.logout().await.unwrap();
        assert!(!store.is_live());

        assert!(store.restore().await.unwrap().is_none());
        assert!(!store.is_live());
    }

    /// Storage that loads a fixed value but cannot be cleared
    struct StuckStorage(Option<String>);

    #[async_trait::async_trait]
    impl TokenStorage for StuckStorage {
        async fn load(&self) -> Result<Option<String>, Error> {
            Ok(self.0.clone())
        }

        async fn save(&self, _value: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), Error> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[tokio::test]
    async fn logout_signals_even_when_storage_fails() {
        let store = store_with(Arc::new(StuckStorage(Some(pair(token_with(300, &["Broker"]))))));
        store.restore().await.unwrap();
        assert!(store.is_live());
        let mut events = store.subscribe();

        let err = store.logout().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!store.is_live());
        assert!(store.session().is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SignedOut);
    }

    #[tokio::test]
    async fn corrupt_restore_signals_even_when_storage_fails() {
        let store = store_with(Arc::new(StuckStorage(Some("not json".to_string()))));
        let mut events = store.subscribe();

        let err = store.restore().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!store.is_live());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Cleared);
    }

    #[tokio::test]
    async fn empty_role_set_is_false() {
        let storage = Arc::new(MemoryStorage::with_value(&pair(token_with(300, &["Broker"]))));
        let store = store_with(storage);
        store.restore().await.unwrap();
        let none: [&str; 0] = [];
        assert!(!store.has_any_role(&none));
    }
}
