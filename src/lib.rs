//! Shamah dashboard client
//!
//! Client-side session handling for the Shamah cargo-insurance dashboard:
//! a [`SessionStore`](auth::SessionStore) that owns the login state, a
//! [`RouteGuard`](guard::RouteGuard) that gates views by role, a
//! [`PollingFetcher`](poll::PollingFetcher) that keeps lists fresh, and a
//! typed [`ApiClient`](api::ApiClient) for the remote API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod poll;

use reqwest::Client;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::{MemoryStorage, SessionStore, TokenStorage};
use crate::config::ClientOptions;
use crate::guard::RouteGuard;

/// The main entry point for the Shamah client
pub struct Shamah {
    /// Base URL of the API, e.g. `http://localhost:8000/api/v1`
    pub url: String,
    /// HTTP client shared by every call
    pub http_client: Client,
    /// Client options
    pub options: ClientOptions,
    session: SessionStore,
}

impl Shamah {
    /// Create a client whose session lives in memory only
    ///
    /// # Example
    ///
    /// ```
    /// use shamah_client::Shamah;
    ///
    /// let shamah = Shamah::new("http://localhost:8000/api/v1");
    /// assert!(!shamah.session().is_live());
    /// ```
    pub fn new(api_url: &str) -> Self {
        Self::new_with_options(api_url, ClientOptions::default(), Arc::new(MemoryStorage::new()))
    }

    /// Create a client with custom options and durable storage
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use shamah_client::{Shamah, auth::FileStorage, config::ClientOptions};
    ///
    /// let options = ClientOptions::default();
    /// let storage = FileStorage::new(std::env::temp_dir(), &options.storage_key);
    /// let shamah = Shamah::new_with_options("http://localhost:8000/api/v1", options, Arc::new(storage));
    /// ```
    pub fn new_with_options(
        api_url: &str,
        options: ClientOptions,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        let http_client = Client::new();
        let session = SessionStore::new(api_url, http_client.clone(), options.clone(), storage);

        Self {
            url: session.api_url().to_string(),
            http_client,
            options,
            session,
        }
    }

    /// The session store. Clone it to share with other tasks.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// A guard over the dashboard's routes
    pub fn guard(&self) -> RouteGuard<'_> {
        RouteGuard::new(&self.session)
    }

    /// Client for the API resources, authorized by the current session
    pub fn api(&self) -> ApiClient {
        ApiClient::new(self.http_client.clone(), self.session.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::api::{ApiClient, Proposal, ProposalStatus};
    pub use crate::auth::{Session, SessionEvent, SessionStore};
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::guard::{Decision, RouteGuard, RouteRequirement};
    pub use crate::poll::{start_polling, CancelHandle, PollMode, PollingFetcher};
    pub use crate::Shamah;
}
