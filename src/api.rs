//! Typed calls against the dashboard API.
//!
//! Every call carries the current session's bearer token. A 401 is not
//! handled specially: it surfaces as [`Error::Fetch`] like any other status.

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::auth::SessionStore;
use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::poll::{CancelHandle, PollingFetcher};

/// Lifecycle of a proposal on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    /// PDF generation running
    Processing,
    /// PDF ready
    Completed,
    #[serde(other)]
    Unknown,
}

/// A proposal as listed by the API. Monetary values arrive as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    pub status: ProposalStatus,
    #[serde(default)]
    pub quote_request: Option<i64>,
    #[serde(default)]
    pub proposal_date: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
    #[serde(default)]
    pub total_premium: Option<String>,
    #[serde(default)]
    pub pdf_file: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A client's request for a cargo-insurance quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub id: i64,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_document: Option<String>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub request_date: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// An audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Answer to a proposal action (approve, reject, generate PDF)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub proposal_status: Option<ProposalStatus>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A dashboard user, as listed on the admin view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// An insurance company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insurer {
    pub id: i64,
    pub name: String,
}

/// A cargo category insurers quote for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchandiseType {
    pub id: i64,
    pub name: String,
}

/// One row of the quotes-by-status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    #[serde(default)]
    pub status: Option<String>,
    pub count: u64,
}

/// One row of the premium-by-insurer report, over completed proposals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurerPremium {
    /// `None` when the proposal has no insurer
    #[serde(rename = "quote_result__insurer__name", default)]
    pub insurer: Option<String>,
    #[serde(default, deserialize_with = "decimal")]
    pub total_premium: Option<f64>,
}

/// Aggregated decimals arrive as numbers or as strings depending on the
/// server's coercion settings.
fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// Client for the dashboard's resources
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    store: SessionStore,
}

impl ApiClient {
    pub fn new(client: Client, store: SessionStore) -> Self {
        Self { client, store }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.store.api_url(), path)
    }

    /// Attach the current bearer token, or fail without a session
    fn authorized<'a>(&self, builder: FetchBuilder<'a>) -> Result<FetchBuilder<'a>, Error> {
        let token = self.store.access_token().ok_or(Error::MissingSession)?;
        Ok(builder
            .bearer_auth(&token)
            .timeout(self.store.options().request_timeout))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path);
        self.authorized(Fetch::get(&self.client, &url))?
            .execute::<T>()
            .await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path);
        self.authorized(Fetch::post(&self.client, &url))?
            .execute::<T>()
            .await
    }

    /// All quote requests visible to the user
    pub async fn list_quote_requests(&self) -> Result<Vec<QuoteRequest>, Error> {
        self.get("/quotes/requests/").await
    }

    /// All proposals visible to the user
    pub async fn list_proposals(&self) -> Result<Vec<Proposal>, Error> {
        self.get("/quotes/proposals/").await
    }

    /// A single proposal
    pub async fn get_proposal(&self, id: i64) -> Result<Proposal, Error> {
        self.get(&format!("/quotes/proposals/{}/", id)).await
    }

    /// Approve a pending proposal (managers only, enforced by the server)
    pub async fn approve_proposal(&self, id: i64) -> Result<ActionResponse, Error> {
        self.post(&format!("/quotes/proposals/{}/approve/", id)).await
    }

    /// Reject a pending proposal
    pub async fn reject_proposal(&self, id: i64) -> Result<ActionResponse, Error> {
        self.post(&format!("/quotes/proposals/{}/reject/", id)).await
    }

    /// Ask the server to render the proposal PDF. Rendering runs in the
    /// background; poll the proposal until its status is `Completed`.
    pub async fn generate_pdf(&self, id: i64) -> Result<ActionResponse, Error> {
        self.post(&format!("/quotes/proposals/{}/generate_pdf/", id))
            .await
    }

    /// Raw bytes of a rendered proposal PDF
    pub async fn download_pdf(&self, id: i64) -> Result<Vec<u8>, Error> {
        let url = self.url(&format!("/quotes/proposals/{}/download_pdf/", id));
        self.authorized(Fetch::get(&self.client, &url))?
            .execute_bytes()
            .await
    }

    /// Latest audit entries, newest first
    pub async fn recent_activity(&self, limit: u32) -> Result<Vec<Activity>, Error> {
        let url = self.url("/audits/recent-activity/");
        self.authorized(Fetch::get(&self.client, &url))?
            .query("limit", limit)
            .execute::<Vec<Activity>>()
            .await
    }

    /// All user accounts (admin view)
    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.get("/users/").await
    }

    /// All insurers (admin view)
    pub async fn list_insurers(&self) -> Result<Vec<Insurer>, Error> {
        self.get("/insurers/").await
    }

    /// All merchandise types (admin view)
    pub async fn list_merchandise_types(&self) -> Result<Vec<MerchandiseType>, Error> {
        self.get("/insurers/merchandise-types/").await
    }

    /// Number of quote requests per status
    pub async fn quotes_by_status_report(&self) -> Result<Vec<StatusCount>, Error> {
        self.get("/audits/reports/quotes-by-status/").await
    }

    /// Total premium of completed proposals per insurer
    pub async fn proposals_by_insurer_report(&self) -> Result<Vec<InsurerPremium>, Error> {
        self.get("/audits/reports/proposals-by-insurer/").await
    }

    /// Keep a proposal list fresh with the configured interval and mode.
    ///
    /// The token is read on every tick, so a login or logout between ticks
    /// is picked up; without a session each tick reports `MissingSession`.
    pub fn poll_proposals<U>(&self, on_update: U) -> CancelHandle
    where
        U: Fn(Result<Vec<Proposal>, Error>) + Send + Sync + 'static,
    {
        let options = self.store.options();
        let poller = PollingFetcher::new(options.poll_interval).with_mode(options.poll_mode);
        let api = self.clone();

        poller.start(
            move || {
                let api = api.clone();
                async move { api.list_proposals().await }
            },
            on_update,
        )
    }
}
