pub mod cancel;
pub mod filter;

pub use cancel::CancellationFlag;
pub use filter::RepoFilter;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::activity::{self, PrRecord};
use crate::forge::{Forge, ForgeError, PullRequestCursor, RepoRef, RetryPolicy};
use crate::report::ReportError;
use crate::window::DateWindow;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Receives each repository's records as soon as the repository is finished.
pub trait RepositorySink {
    fn record(&mut self, repo: &str, prs: Vec<PrRecord>) -> Result<(), ReportError>;
}

/// Counters describing what a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories_listed: usize,
    pub repositories_filtered: usize,
    pub repositories_failed: usize,
    pub repositories_recorded: usize,
    pub pull_requests: usize,
    /// The run stopped early on a cancellation request.
    pub interrupted: bool,
}

/// Walks every repository of an organization, strictly one at a time.
pub struct OrganizationPipeline<'a> {
    forge: &'a dyn Forge,
    retry: RetryPolicy,
    window: DateWindow,
    filter: RepoFilter,
    cancel: CancellationFlag,
}

impl<'a> OrganizationPipeline<'a> {
    pub fn new(forge: &'a dyn Forge, retry: RetryPolicy, window: DateWindow) -> Self {
        Self {
            forge,
            retry,
            window,
            filter: RepoFilter::accept_all(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_filter(mut self, filter: RepoFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process the organization, handing each repository with at least one
    /// qualifying PR to `sink`.
    ///
    /// A failing repository is logged and skipped. A missing organization or an
    /// exhausted rate limit aborts the run; whatever `sink` already received stays
    /// with it. Cancellation is checked before each repository, so the one in
    /// flight always completes.
    #[instrument(skip(self, sink), fields(backend = self.forge.name()))]
    pub async fn run(
        &self,
        org: &str,
        sink: &mut dyn RepositorySink,
    ) -> Result<RunSummary, PipelineError> {
        let forge = self.forge;
        let repos = self
            .retry
            .run(&format!("list repositories of {org}"), move || forge.list_repositories(org))
            .await?;
        info!(count = repos.len(), "fetched repository list");

        let mut summary = RunSummary {
            repositories_listed: repos.len(),
            ..RunSummary::default()
        };

        for name in repos {
            if self.cancel.is_cancelled() {
                info!(next = %name, "cancellation requested, stopping");
                summary.interrupted = true;
                break;
            }
            if !self.filter.admits(&name) {
                debug!(repo = %name, "excluded by repository filter");
                summary.repositories_filtered += 1;
                continue;
            }

            let repo = RepoRef::new(org, name.as_str());
            match self.collect_repository(&repo).await {
                Ok(prs) if prs.is_empty() => debug!(repo = %name, "no qualifying PRs"),
                Ok(prs) => {
                    info!(repo = %name, prs = prs.len(), "repository complete");
                    summary.repositories_recorded += 1;
                    summary.pull_requests += prs.len();
                    sink.record(&name, prs)?;
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(repo = %name, error = %err, "failed to fetch PRs, skipping repository");
                    summary.repositories_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn collect_repository(&self, repo: &RepoRef) -> Result<Vec<PrRecord>, ForgeError> {
        info!(repo = %repo, "fetching PRs");
        let forge = self.forge;
        let mut cursor = PullRequestCursor::new(forge, &self.retry, repo, self.window);
        let mut records = Vec::new();

        while let Some(summary) = cursor.next().await? {
            let pr = repo.pull(summary.number);
            let pr_ref = &pr;
            let detail = self
                .retry
                .run(&format!("fetch {pr}"), move || forge.pull_request(pr_ref))
                .await?;
            let sources = activity::collect_sources(forge, &self.retry, &pr).await?;

            if let Some(record) = activity::build_record(&detail, &sources, &self.window) {
                debug!(pr = %pr, events = record.events.len(), "collected PR");
                records.push(record);
            }
        }
        Ok(records)
    }
}
