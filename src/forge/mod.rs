pub mod gh_cli;
pub mod rest;
pub mod retry;
#[cfg(test)]
pub mod testing;
pub mod types;
pub mod wire;

pub use retry::RetryPolicy;
pub use types::{Comment, PrDetail, PrRef, PrSummary, RepoRef, Review};

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::window::DateWindow;

/// Page size requested from paginated listing endpoints.
pub const PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Organization '{0}' not found or not accessible")]
    OrgNotFound(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A bare 403 that may be throttling or a missing permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded and max retries reached ({attempts} attempts to {operation})")]
    RateLimitExhausted { operation: String, attempts: u32 },

    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("gh command failed: {0}")]
    Command(String),

    #[error("GitHub CLI (gh) not found. Install from https://cli.github.com/")]
    CliMissing,

    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ForgeError {
    /// A signal the retry policy should back off and try again.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ForgeError::RateLimited(_) | ForgeError::Forbidden(_))
    }

    /// Errors that end the whole run rather than one repository.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForgeError::RateLimitExhausted { .. } | ForgeError::OrgNotFound(_)
        )
    }
}

/// Read access to a source forge.
///
/// Implemented once over HTTP and once over the `gh` CLI; everything above this
/// trait is backend-agnostic.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Upper bound on a single backoff sleep for this backend.
    fn backoff_cap(&self) -> Duration;

    /// All repository names in `org`.
    async fn list_repositories(&self, org: &str) -> Result<Vec<String>, ForgeError>;

    /// One page (1-based) of the repository's pull requests, newest-created first.
    /// A page shorter than [`PER_PAGE`] is the last one.
    async fn pull_request_page(
        &self,
        repo: &RepoRef,
        page: u32,
    ) -> Result<Vec<PrSummary>, ForgeError>;

    async fn pull_request(&self, pr: &PrRef) -> Result<PrDetail, ForgeError>;

    /// Inline code comments.
    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError>;

    /// Conversation comments.
    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError>;

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>, ForgeError>;
}

/// Walks a repository's pull requests inside a date window.
///
/// PRs created after `until` are skipped; the first PR created before `since`
/// ends the walk without fetching further pages, relying on newest-first order.
pub struct PullRequestCursor<'a> {
    forge: &'a dyn Forge,
    retry: &'a RetryPolicy,
    repo: &'a RepoRef,
    window: DateWindow,
    next_page: u32,
    buffer: VecDeque<PrSummary>,
    done: bool,
    newest_seen: Option<DateTime<Utc>>,
    order_warned: bool,
}

impl<'a> PullRequestCursor<'a> {
    pub fn new(
        forge: &'a dyn Forge,
        retry: &'a RetryPolicy,
        repo: &'a RepoRef,
        window: DateWindow,
    ) -> Self {
        Self {
            forge,
            retry,
            repo,
            window,
            next_page: 1,
            buffer: VecDeque::new(),
            done: false,
            newest_seen: None,
            order_warned: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<PrSummary>, ForgeError> {
        loop {
            if let Some(pr) = self.buffer.pop_front() {
                self.check_order(&pr);
                let day = pr.created_at.date_naive();

                if self.window.ends_before(day) {
                    continue;
                }
                if self.window.starts_after(day) {
                    debug!(repo = %self.repo, pr = pr.number, "reached PRs older than window start, stopping");
                    self.finish();
                    return Ok(None);
                }
                debug!(repo = %self.repo, pr = pr.number, title = %pr.title, "found PR");
                return Ok(Some(pr));
            }

            if self.done {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), ForgeError> {
        let forge = self.forge;
        let repo = self.repo;
        let page = self.next_page;
        let operation = format!("list pull requests of {repo} (page {page})");

        let prs = self
            .retry
            .run(&operation, move || forge.pull_request_page(repo, page))
            .await?;

        if prs.len() < PER_PAGE {
            self.done = true;
        }
        self.next_page += 1;
        self.buffer.extend(prs);
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer.clear();
    }

    fn check_order(&mut self, pr: &PrSummary) {
        if let Some(previous) = self.newest_seen {
            if pr.created_at > previous && !self.order_warned {
                warn!(
                    repo = %self.repo,
                    pr = pr.number,
                    "pull requests are not ordered newest-first; the date window may under-collect"
                );
                self.order_warned = true;
            }
        }
        self.newest_seen = Some(pr.created_at);
    }
}
