//! Backend that shells out to the GitHub CLI.
//!
//! Useful where token-based API access is awkward (enterprise managed users,
//! SSO-enforced orgs): `gh` brings its own stored credentials. Calls go through
//! `gh api`, so responses have the same JSON shape as the REST backend.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::retry::CLI_BACKOFF_CAP;
use super::wire::{ApiComment, ApiPullRequest, ApiReview};
use super::{Comment, Forge, ForgeError, PrDetail, PrRef, PrSummary, RepoRef, Review, PER_PAGE};

/// Substrings in `gh` error output that indicate throttling.
const RATE_LIMIT_MARKERS: [&str; 4] = [
    "rate limit",
    "secondary rate limit",
    "abuse detection",
    "retry-after",
];

/// Also seen on throttling, but equally on plain permission errors.
const FORBIDDEN_MARKER: &str = "403";

const REPO_LIST_LIMIT: &str = "10000";

/// Runs one `gh` invocation and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, ForgeError>;
}

/// Spawns the real `gh` executable.
pub struct GhCommand {
    program: PathBuf,
}

impl GhCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for GhCommand {
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, ForgeError> {
        debug!(command = %format!("{} {}", self.program.display(), args.join(" ")), "running");

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => ForgeError::CliMissing,
                _ => ForgeError::Command(err.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(classify_failure(message));
        }
        Ok(output.stdout)
    }
}

/// Heuristic match of `gh` error text against known throttling messages.
pub fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| message.contains(marker))
}

pub(super) fn classify_failure(message: String) -> ForgeError {
    if is_rate_limit_message(&message) {
        ForgeError::RateLimited(message)
    } else if message.contains(FORBIDDEN_MARKER) {
        ForgeError::Forbidden(message)
    } else if message.contains("Could not resolve to") || message.contains("Not Found") {
        ForgeError::NotFound(message)
    } else {
        ForgeError::Command(message)
    }
}

/// Parse `gh api --paginate` output, which is one JSON array per page written
/// back to back. Non-array values are ignored.
fn parse_pages<T: DeserializeOwned>(stdout: &[u8]) -> Result<Vec<T>, ForgeError> {
    let mut items = Vec::new();
    for value in serde_json::Deserializer::from_slice(stdout).into_iter::<serde_json::Value>() {
        match value? {
            serde_json::Value::Array(page) => {
                for item in page {
                    items.push(serde_json::from_value(item)?);
                }
            }
            other => debug!(kind = %json_kind(&other), "ignoring non-array gh output"),
        }
    }
    Ok(items)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Object(_) => "object",
        serde_json::Value::String(_) => "string",
        _ => "scalar",
    }
}

#[derive(Deserialize)]
struct RepoListEntry {
    name: String,
}

/// GitHub CLI backend.
pub struct GhCliForge<R = GhCommand> {
    runner: R,
}

impl<R: CommandRunner> GhCliForge<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn api_pages<T: DeserializeOwned>(&self, endpoint: String) -> Result<Vec<T>, ForgeError> {
        let stdout = self
            .runner
            .run(&["api".to_string(), endpoint, "--paginate".to_string()])
            .await?;
        parse_pages(&stdout)
    }
}

fn pr_endpoint(pr: &PrRef) -> String {
    format!("repos/{}/{}/pulls/{}", pr.repo.owner, pr.repo.name, pr.number)
}

#[async_trait]
impl<R: CommandRunner> Forge for GhCliForge<R> {
    fn name(&self) -> &'static str {
        "gh-cli"
    }

    fn backoff_cap(&self) -> Duration {
        CLI_BACKOFF_CAP
    }

    #[instrument(skip(self))]
    async fn list_repositories(&self, org: &str) -> Result<Vec<String>, ForgeError> {
        let args: Vec<String> = ["repo", "list", org, "--json", "name", "--limit", REPO_LIST_LIMIT]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stdout = self.runner.run(&args).await.map_err(|err| match err {
            ForgeError::NotFound(_) => ForgeError::OrgNotFound(org.to_string()),
            other => other,
        })?;

        let repos: Vec<RepoListEntry> = parse_pages(&stdout)?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn pull_request_page(
        &self,
        repo: &RepoRef,
        page: u32,
    ) -> Result<Vec<PrSummary>, ForgeError> {
        let endpoint = format!(
            "repos/{}/{}/pulls?state=all&sort=created&direction=desc&per_page={PER_PAGE}&page={page}",
            repo.owner, repo.name
        );
        let stdout = self.runner.run(&["api".to_string(), endpoint]).await?;
        let prs: Vec<ApiPullRequest> = parse_pages(&stdout)?;
        Ok(prs.into_iter().map(PrSummary::from).collect())
    }

    async fn pull_request(&self, pr: &PrRef) -> Result<PrDetail, ForgeError> {
        let stdout = self.runner.run(&["api".to_string(), pr_endpoint(pr)]).await?;
        let detail: ApiPullRequest = serde_json::from_slice(&stdout)?;
        Ok(detail.into())
    }

    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        let comments: Vec<ApiComment> = self.api_pages(format!("{}/comments", pr_endpoint(pr))).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        let endpoint = format!(
            "repos/{}/{}/issues/{}/comments",
            pr.repo.owner, pr.repo.name, pr.number
        );
        let comments: Vec<ApiComment> = self.api_pages(endpoint).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>, ForgeError> {
        let reviews: Vec<ApiReview> = self.api_pages(format!("{}/reviews", pr_endpoint(pr))).await?;
        Ok(reviews.into_iter().map(Review::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::testing::ScriptedRunner;
    use crate::forge::types::ReviewDisposition;

    #[test]
    fn test_rate_limit_heuristic() {
        assert!(is_rate_limit_message("API rate limit exceeded"));
        assert!(is_rate_limit_message("secondary rate limit triggered"));
        assert!(is_rate_limit_message("You have triggered an abuse detection mechanism"));
        assert!(is_rate_limit_message("Retry-After: 60"));
        assert!(!is_rate_limit_message("Request failed with status 403"));
        assert!(!is_rate_limit_message("permission denied"));
        assert!(!is_rate_limit_message("not found"));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("HTTP 403: API rate limit exceeded".into()),
            ForgeError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure("gh: Resource not accessible by integration (HTTP 403)".into()),
            ForgeError::Forbidden(_)
        ));
        assert!(matches!(
            classify_failure("GraphQL: Could not resolve to an Organization with the login of 'ghost'.".into()),
            ForgeError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("HTTP 404: Not Found".into()),
            ForgeError::NotFound(_)
        ));
        assert!(matches!(classify_failure("boom".into()), ForgeError::Command(_)));
    }

    #[test]
    fn test_parse_concatenated_pages() {
        let stdout = br#"[{"name":"a"},{"name":"b"}]
[{"name":"c"}]"#;
        let repos: Vec<RepoListEntry> = parse_pages(stdout).unwrap();
        let names: Vec<_> = repos.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_empty_and_non_array_output() {
        let empty: Vec<RepoListEntry> = parse_pages(b"  \n").unwrap();
        assert!(empty.is_empty());
        let object: Vec<RepoListEntry> = parse_pages(br#"{"message":"ok"}"#).unwrap();
        assert!(object.is_empty());
        assert!(parse_pages::<RepoListEntry>(b"[{").is_err());
    }

    #[tokio::test]
    async fn test_list_repositories() {
        let runner = ScriptedRunner::default().reply(
            "repo list acme --json name --limit 10000",
            r#"[{"name":"payments-api"},{"name":"web"}]"#,
        );
        let forge = GhCliForge::new(runner);
        assert_eq!(forge.list_repositories("acme").await.unwrap(), vec!["payments-api", "web"]);
    }

    #[tokio::test]
    async fn test_unknown_org() {
        let runner = ScriptedRunner::default().fail(
            "repo list ghost --json name --limit 10000",
            "GraphQL: Could not resolve to an Organization with the login of 'ghost'.",
        );
        let err = GhCliForge::new(runner).list_repositories("ghost").await.unwrap_err();
        assert!(matches!(err, ForgeError::OrgNotFound(ref org) if org == "ghost"));
    }

    #[tokio::test]
    async fn test_pull_request_page_uses_rest_listing() {
        let runner = ScriptedRunner::default().reply(
            "api repos/acme/web/pulls?state=all&sort=created&direction=desc&per_page=100&page=3",
            r#"[{"number":9,"title":"Bump deps","user":{"login":"bot"},"created_at":"2025-06-15T10:00:00Z","state":"closed","merged_at":null,"closed_at":"2025-06-16T10:00:00Z"}]"#,
        );
        let forge = GhCliForge::new(runner);
        let page = forge.pull_request_page(&RepoRef::new("acme", "web"), 3).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].number, 9);
    }

    #[tokio::test]
    async fn test_reviews_are_paginated() {
        let runner = ScriptedRunner::default().reply(
            "api repos/acme/web/pulls/9/reviews --paginate",
            r#"[{"user":{"login":"bob"},"state":"APPROVED","body":"","submitted_at":"2025-06-16T10:00:00Z"}][{"user":{"login":"eve"},"state":"COMMENTED","body":"nit","submitted_at":"2025-06-17T10:00:00Z"}]"#,
        );
        let forge = GhCliForge::new(runner);
        let reviews = forge.reviews(&RepoRef::new("acme", "web").pull(9)).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].disposition, ReviewDisposition::Approved);
        assert_eq!(reviews[1].body.as_deref(), Some("nit"));
        assert_eq!(forge.runner.invocations_matching("api "), 1);
    }

    #[tokio::test]
    async fn test_detail_and_comments() {
        let runner = ScriptedRunner::default()
            .reply(
                "api repos/acme/web/pulls/9",
                r#"{"number":9,"title":"Bump deps","user":{"login":"bot"},"created_at":"2025-06-15T10:00:00Z","state":"closed","merged":false,"merged_by":null,"merged_at":null,"closed_at":"2025-06-16T10:00:00Z"}"#,
            )
            .reply(
                "api repos/acme/web/issues/9/comments --paginate",
                r#"[{"user":{"login":"alice"},"created_at":"2025-06-15T11:00:00Z"}]"#,
            )
            .fail("api repos/acme/web/pulls/9/comments --paginate", "HTTP 500: Server Error");
        let forge = GhCliForge::new(runner);
        let pr = RepoRef::new("acme", "web").pull(9);

        let detail = forge.pull_request(&pr).await.unwrap();
        assert!(!detail.merged);
        assert!(detail.closed_at.is_some());

        let comments = forge.issue_comments(&pr).await.unwrap();
        assert_eq!(comments[0].actor.as_deref(), Some("alice"));

        assert!(matches!(forge.review_comments(&pr).await, Err(ForgeError::Command(_))));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let runner = GhCommand::new("/nonexistent/path/to/gh");
        let err = runner.run(&["--version".to_string()]).await.unwrap_err();
        assert!(matches!(err, ForgeError::CliMissing));
    }
}
