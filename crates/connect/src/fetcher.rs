//! Per-user document retrieval with the backfill-window policy.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use ourabridge_core::credentials::{Credential, CredentialStore};
use ourabridge_core::documents::{map_document, map_search_page, DocumentType};
use ourabridge_core::{Error as CoreError, Observation};

use crate::client::ApiClient;
use crate::error::{ConnectError, Result};
use crate::oauth::{OAuthClient, RefreshingTokenSource, TokenRefreshInterceptor, TokenSource};

/// Days searched back for a user that has never been polled.
pub const FIRST_CONTACT_DAYS: i64 = 7;
/// Days searched back once a poll has succeeded.
pub const STEADY_STATE_DAYS: i64 = 1;
/// Days searched ahead, covering documents dated "tomorrow" in the user's zone.
pub const FORWARD_DAYS: i64 = 1;
/// Upper bound on `next_token` pages followed per document type.
pub const MAX_PAGES: usize = 10;

/// Inclusive date range passed to the search endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BackfillWindow {
    pub fn for_last_poll(last_poll: Option<DateTime<Utc>>, today: NaiveDate) -> Self {
        let back = if last_poll.is_none() {
            FIRST_CONTACT_DAYS
        } else {
            STEADY_STATE_DAYS
        };
        Self {
            start: today - Duration::days(back),
            end: today + Duration::days(FORWARD_DAYS),
        }
    }

    pub fn days_back(&self, today: NaiveDate) -> i64 {
        (today - self.start).num_days()
    }

    fn query(&self, doc_type: DocumentType) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("start_date", self.start.format("%Y-%m-%d").to_string()),
            ("end_date", self.end.format("%Y-%m-%d").to_string()),
        ];
        if doc_type == DocumentType::Heartrate {
            query.push(("start_datetime", format!("{}T00:00:00Z", query[0].1)));
            query.push(("end_datetime", format!("{}T00:00:00Z", query[1].1)));
        }
        query
    }
}

/// Outcome of one resync pass over every searchable type.
#[derive(Debug, Default)]
pub struct ResyncReport {
    pub window: Option<BackfillWindow>,
    pub observations: Vec<Observation>,
    pub documents: usize,
    pub failed_types: Vec<DocumentType>,
}

pub struct DocumentFetcher {
    api: ApiClient,
    oauth: OAuthClient,
    store: Arc<CredentialStore>,
}

impl DocumentFetcher {
    pub fn new(api: ApiClient, oauth: OAuthClient, store: Arc<CredentialStore>) -> Self {
        Self { api, oauth, store }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Token source for `cred` whose refreshes are written back to the store.
    pub fn token_source(
        &self,
        cred: &Credential,
    ) -> Result<TokenRefreshInterceptor<RefreshingTokenSource>> {
        let token = cred
            .oauth_token
            .clone()
            .ok_or_else(|| ConnectError::auth(format!("no token stored for {}", cred.name)))?;
        Ok(TokenRefreshInterceptor::new(
            RefreshingTokenSource::new(self.oauth.clone(), token),
            self.store.clone(),
            cred.name.clone(),
        ))
    }

    fn credential(&self, username: &str) -> Result<Credential> {
        self.store
            .find(username)
            .ok_or_else(|| CoreError::UnknownUser(username.to_string()).into())
    }

    /// Searches every document type for `username` over the backfill window.
    ///
    /// A failure for one type is logged and the pass moves on. Fatal and
    /// credential errors end the pass.
    pub async fn resync(&self, username: &str) -> Result<ResyncReport> {
        let cred = self.credential(username)?;
        let tokens = self.token_source(&cred)?;
        let today = Utc::now().date_naive();
        let window = BackfillWindow::for_last_poll(cred.last_poll, today);
        info!(
            "resyncing {username}: {} to {} ({} day(s) back)",
            window.start,
            window.end,
            window.days_back(today)
        );

        let mut report = ResyncReport {
            window: Some(window),
            ..Default::default()
        };
        for doc_type in DocumentType::SEARCHABLE {
            match self.search(&tokens, username, doc_type, &window).await {
                Ok((documents, observations)) => {
                    debug!(
                        "{username}: {documents} {doc_type} document(s), {} observation(s)",
                        observations.len()
                    );
                    report.documents += documents;
                    report.observations.extend(observations);
                }
                Err(e) if e.is_fatal() || matches!(e, ConnectError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!("{username}: fetching {doc_type} failed: {e}");
                    report.failed_types.push(doc_type);
                }
            }
        }
        Ok(report)
    }

    async fn search(
        &self,
        tokens: &dyn TokenSource,
        username: &str,
        doc_type: DocumentType,
        window: &BackfillWindow,
    ) -> Result<(usize, Vec<Observation>)> {
        let path = format!("usercollection/{doc_type}");
        let mut documents = 0;
        let mut observations = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = window.query(doc_type);
            if let Some(token) = next_token.take() {
                query.push(("next_token", token));
            }
            let body = self.api.get(tokens, &path, &query).await?;
            let page = map_search_page(doc_type, &body, username)?;
            documents += page.documents;
            observations.extend(page.observations);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok((documents, observations)),
            }
        }
        warn!("{username}: {doc_type} still paginating after {MAX_PAGES} pages");
        Ok((documents, observations))
    }

    /// Fetches the single document a webhook event points at.
    pub async fn fetch_document(
        &self,
        username: &str,
        doc_type: DocumentType,
        object_id: &str,
    ) -> Result<Vec<Observation>> {
        if !doc_type.is_notified() {
            return Err(ConnectError::invalid_request(format!(
                "no single-document fetch for {doc_type}"
            )));
        }
        let cred = self.credential(username)?;
        let tokens = self.token_source(&cred)?;
        let body = self
            .api
            .get(&tokens, &format!("usercollection/{doc_type}/{object_id}"), &[])
            .await?;
        let observations = map_document(doc_type, &body, username)?;
        debug!(
            "{username}: {doc_type}/{object_id} gave {} observation(s)",
            observations.len()
        );
        Ok(observations)
    }
}
