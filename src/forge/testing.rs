//! In-memory [`Forge`] used by unit tests. Every call is logged so tests can
//! assert which upstream requests were (or were not) made.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::gh_cli::{classify_failure, CommandRunner};
use super::types::{PrState, ReviewDisposition};
use super::{Comment, Forge, ForgeError, PrDetail, PrRef, PrSummary, RepoRef, Review, PER_PAGE};

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn pr_summary(number: u64, created_at: &str) -> PrSummary {
    PrSummary {
        number,
        title: format!("PR {number}"),
        created_at: ts(created_at),
    }
}

pub fn open_pr(number: u64, author: Option<&str>, created_at: &str) -> PrDetail {
    PrDetail {
        number,
        title: format!("PR {number}"),
        author: author.map(str::to_string),
        created_at: ts(created_at),
        state: PrState::Open,
        merged: false,
        merged_by: None,
        merged_at: None,
        closed_at: None,
    }
}

pub fn comment(actor: &str, at: &str) -> Comment {
    Comment {
        actor: Some(actor.to_string()),
        created_at: Some(ts(at)),
    }
}

pub fn review(actor: &str, at: &str, disposition: ReviewDisposition, body: &str) -> Review {
    Review {
        actor: Some(actor.to_string()),
        submitted_at: Some(ts(at)),
        disposition,
        body: Some(body.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transport,
    RateLimit,
}

impl Failure {
    fn error(self, call: &str) -> ForgeError {
        match self {
            Failure::Transport => ForgeError::Command(format!("{call} failed")),
            Failure::RateLimit => ForgeError::RateLimited(format!("{call}: API rate limit exceeded")),
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FakeForge {
    repos: Vec<String>,
    org_missing: bool,
    pulls: HashMap<String, Vec<PrSummary>>,
    details: HashMap<(String, u64), PrDetail>,
    review_comments: HashMap<(String, u64), Vec<Comment>>,
    issue_comments: HashMap<(String, u64), Vec<Comment>>,
    reviews: HashMap<(String, u64), Vec<Review>>,
    failures: HashMap<String, Failure>,
    hooks: Vec<(String, Hook)>,
    calls: Mutex<Vec<String>>,
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repos(mut self, names: &[&str]) -> Self {
        self.repos = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_missing_org(mut self) -> Self {
        self.org_missing = true;
        self
    }

    pub fn with_pulls(mut self, repo: &str, pulls: Vec<PrSummary>) -> Self {
        self.pulls.insert(repo.to_string(), pulls);
        self
    }

    pub fn with_detail(mut self, repo: &str, detail: PrDetail) -> Self {
        self.details.insert((repo.to_string(), detail.number), detail);
        self
    }

    pub fn with_review_comments(mut self, repo: &str, number: u64, comments: Vec<Comment>) -> Self {
        self.review_comments.insert((repo.to_string(), number), comments);
        self
    }

    pub fn with_issue_comments(mut self, repo: &str, number: u64, comments: Vec<Comment>) -> Self {
        self.issue_comments.insert((repo.to_string(), number), comments);
        self
    }

    pub fn with_reviews(mut self, repo: &str, number: u64, reviews: Vec<Review>) -> Self {
        self.reviews.insert((repo.to_string(), number), reviews);
        self
    }

    /// Make every call whose log entry starts with `call` fail.
    pub fn failing(mut self, call: &str, failure: Failure) -> Self {
        self.failures.insert(call.to_string(), failure);
        self
    }

    /// Run `hook` whenever a call whose log entry starts with `call` is made.
    pub fn on_call(mut self, call: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.push((call.to_string(), Box::new(hook)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) -> Result<(), ForgeError> {
        for (prefix, hook) in &self.hooks {
            if call.starts_with(prefix.as_str()) {
                hook();
            }
        }
        let failure = self
            .failures
            .iter()
            .find(|(prefix, _)| call.starts_with(prefix.as_str()))
            .map(|(_, failure)| *failure);
        self.calls.lock().unwrap().push(call.clone());
        match failure {
            Some(failure) => Err(failure.error(&call)),
            None => Ok(()),
        }
    }

    fn key(pr: &PrRef) -> (String, u64) {
        (pr.repo.name.clone(), pr.number)
    }
}

#[async_trait]
impl Forge for FakeForge {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn backoff_cap(&self) -> Duration {
        Duration::from_secs(900)
    }

    async fn list_repositories(&self, org: &str) -> Result<Vec<String>, ForgeError> {
        self.record(format!("repos {org}"))?;
        if self.org_missing {
            return Err(ForgeError::OrgNotFound(org.to_string()));
        }
        Ok(self.repos.clone())
    }

    async fn pull_request_page(
        &self,
        repo: &RepoRef,
        page: u32,
    ) -> Result<Vec<PrSummary>, ForgeError> {
        self.record(format!("pulls {} page {page}", repo.name))?;
        let all = self.pulls.get(&repo.name).cloned().unwrap_or_default();
        let start = (page as usize - 1) * PER_PAGE;
        Ok(all.into_iter().skip(start).take(PER_PAGE).collect())
    }

    async fn pull_request(&self, pr: &PrRef) -> Result<PrDetail, ForgeError> {
        self.record(format!("detail {}#{}", pr.repo.name, pr.number))?;
        if let Some(detail) = self.details.get(&Self::key(pr)) {
            return Ok(detail.clone());
        }
        let summary = self
            .pulls
            .get(&pr.repo.name)
            .and_then(|pulls| pulls.iter().find(|p| p.number == pr.number))
            .ok_or_else(|| ForgeError::NotFound(pr.to_string()))?;
        let mut detail = open_pr(summary.number, Some("author"), "2025-01-01T00:00:00Z");
        detail.title = summary.title.clone();
        detail.created_at = summary.created_at;
        Ok(detail)
    }

    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        self.record(format!("review_comments {}#{}", pr.repo.name, pr.number))?;
        Ok(self.review_comments.get(&Self::key(pr)).cloned().unwrap_or_default())
    }

    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        self.record(format!("issue_comments {}#{}", pr.repo.name, pr.number))?;
        Ok(self.issue_comments.get(&Self::key(pr)).cloned().unwrap_or_default())
    }

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>, ForgeError> {
        self.record(format!("reviews {}#{}", pr.repo.name, pr.number))?;
        Ok(self.reviews.get(&Self::key(pr)).cloned().unwrap_or_default())
    }
}

/// Answers `gh` invocations from a script keyed by the joined argument list.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Vec<(String, Result<String, String>)>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn reply(mut self, args: &str, stdout: &str) -> Self {
        self.replies.push((args.to_string(), Ok(stdout.to_string())));
        self
    }

    /// Fail the invocation with `stderr`, classified as the real runner would.
    pub fn fail(mut self, args: &str, stderr: &str) -> Self {
        self.replies.push((args.to_string(), Err(stderr.to_string())));
        self
    }

    pub fn invocations_matching(&self, prefix: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, ForgeError> {
        let joined = args.join(" ");
        self.invocations.lock().unwrap().push(joined.clone());
        match self.replies.iter().find(|(key, _)| *key == joined) {
            Some((_, Ok(stdout))) => Ok(stdout.clone().into_bytes()),
            Some((_, Err(stderr))) => Err(classify_failure(stderr.clone())),
            None => Err(ForgeError::Command(format!("unscripted: {joined}"))),
        }
    }
}
