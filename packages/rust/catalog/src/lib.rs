//! Hardcover catalog client.
//!
//! Every call is an authenticated GraphQL POST. A response whose `errors`
//! list is non-empty is treated as a failed call even when the HTTP status is
//! a success, so callers only ever see a typed result or a [`MarginaliaError`].

mod queries;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use marginalia_shared::{
    BookIdentity, CatalogSettings, JournalEntry, LibraryBook, MarginaliaError, Result,
};

use queries::{
    BooksByIsbnData, FIND_BY_ISBN_QUERY, GraphQlResponse, INSERT_JOURNAL_MUTATION,
    InsertJournalData, LIBRARY_QUERY, LibraryData,
};

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("Marginalia/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt kept in a status error.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// HardcoverClient
// ---------------------------------------------------------------------------

/// Authenticated client for the Hardcover GraphQL API.
#[derive(Debug, Clone)]
pub struct HardcoverClient {
    client: Client,
    api_url: Url,
    token: String,
}

impl HardcoverClient {
    /// Build a client from validated settings.
    pub fn new(settings: &CatalogSettings) -> Result<Self> {
        let client = build_client(settings.timeout)?;
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            token: settings.token.clone(),
        })
    }

    /// Endpoint this client talks to.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Fetch the user's full library (books with editions and ISBNs).
    #[instrument(skip_all)]
    pub async fn fetch_library(&self) -> Result<Vec<LibraryBook>> {
        let data: LibraryData = self.request(LIBRARY_QUERY, json!({})).await?;
        let books = data.into_books();
        info!(books = books.len(), "fetched Hardcover library");
        Ok(books)
    }

    /// Look up a book by ISBN-10 or ISBN-13.
    ///
    /// Returns `Ok(None)` when the catalog has no such edition.
    #[instrument(skip(self))]
    pub async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookIdentity>> {
        let data: BooksByIsbnData = self
            .request(FIND_BY_ISBN_QUERY, json!({ "isbn": isbn }))
            .await?;
        let identity = data.into_identity(isbn);
        if identity.is_none() {
            debug!(isbn, "no catalog edition for ISBN");
        }
        Ok(identity)
    }

    /// Create a reading journal entry. Returns the new entry id when reported.
    #[instrument(skip_all, fields(book_id = entry.book_id, edition_id = entry.edition_id, event = entry.event.as_str()))]
    pub async fn insert_journal_entry(&self, entry: &JournalEntry) -> Result<Option<i64>> {
        let variables = json!({
            "bookId": entry.book_id,
            "editionId": entry.edition_id,
            "entry": entry.entry,
            "event": entry.event.as_str(),
        });
        let data: InsertJournalData = self.request(INSERT_JOURNAL_MUTATION, variables).await?;
        Ok(data.entry_id())
    }

    /// POST a GraphQL document and decode its `data` payload.
    async fn request<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| MarginaliaError::Network(format!("{}: {e}", self.api_url)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MarginaliaError::Network(format!("{}: failed to read body: {e}", self.api_url))
        })?;

        let envelope: GraphQlResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(status_error(status.as_u16(), &body));
            }
            Err(e) => {
                return Err(MarginaliaError::parse(format!(
                    "invalid Hardcover response: {e}"
                )));
            }
        };

        let errors = envelope.errors.unwrap_or_default();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.describe()).collect();
            error!(errors = ?messages, "Hardcover API returned errors");
            return Err(MarginaliaError::Api { messages });
        }

        if !status.is_success() {
            warn!(status = status.as_u16(), "Hardcover request failed");
            return Err(status_error(status.as_u16(), &body));
        }

        envelope
            .data
            .ok_or_else(|| MarginaliaError::parse("Hardcover response has no data"))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| MarginaliaError::Network(format!("failed to build HTTP client: {e}")))
}

fn status_error(status: u16, body: &str) -> MarginaliaError {
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    MarginaliaError::Status { status, body }
}
