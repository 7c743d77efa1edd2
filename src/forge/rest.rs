use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::retry::API_BACKOFF_CAP;
use super::wire::{ApiComment, ApiErrorBody, ApiPullRequest, ApiRepository, ApiReview};
use super::{Comment, Forge, ForgeError, PrDetail, PrRef, PrSummary, RepoRef, Review, PER_PAGE};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const USER_AGENT: &str = concat!("pr-activity/", env!("CARGO_PKG_VERSION"));

/// GitHub REST backend: typed JSON responses over reqwest.
pub struct RestForge {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl RestForge {
    /// `token` is `None` for unauthenticated access.
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self, ForgeError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ForgeError> {
        let url = format!("{}/{}", self.api_base, path);
        debug!(%url, ?query, "GET");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Follow `page=1,2,...` until a short page comes back.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ForgeError> {
        let mut items = Vec::new();
        for page in 1u32.. {
            let batch: Vec<T> = self.get_json(path, &page_query(page)).await?;
            let last = batch.len() < PER_PAGE;
            items.extend(batch);
            if last {
                break;
            }
        }
        Ok(items)
    }
}

fn page_query(page: u32) -> Vec<(&'static str, String)> {
    vec![("per_page", PER_PAGE.to_string()), ("page", page.to_string())]
}

fn pr_path(pr: &PrRef) -> String {
    format!("repos/{}/{}/pulls/{}", pr.repo.owner, pr.repo.name, pr.number)
}

/// Turn a non-2xx response into the matching [`ForgeError`].
async fn check_status(response: Response) -> Result<Response, ForgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let limited_by_headers = is_rate_limit_response(status, response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);

    let limited_by_message = matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS)
        && mentions_rate_limit(&message);

    if limited_by_headers || limited_by_message {
        Err(ForgeError::RateLimited(format!("{status}: {message}")))
    } else if status == StatusCode::NOT_FOUND {
        Err(ForgeError::NotFound(message))
    } else {
        Err(ForgeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn is_rate_limit_response(status: StatusCode, headers: &HeaderMap) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => {
            headers.contains_key("retry-after")
                || headers
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    == Some("0")
        }
        _ => false,
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit") || message.contains("abuse detection")
}

#[async_trait]
impl Forge for RestForge {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn backoff_cap(&self) -> Duration {
        API_BACKOFF_CAP
    }

    #[instrument(skip(self))]
    async fn list_repositories(&self, org: &str) -> Result<Vec<String>, ForgeError> {
        let repos: Vec<ApiRepository> = self
            .get_all(&format!("orgs/{org}/repos"))
            .await
            .map_err(|err| match err {
                ForgeError::NotFound(_) => ForgeError::OrgNotFound(org.to_string()),
                other => other,
            })?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn pull_request_page(
        &self,
        repo: &RepoRef,
        page: u32,
    ) -> Result<Vec<PrSummary>, ForgeError> {
        let mut query = vec![
            ("state", "all".to_string()),
            ("sort", "created".to_string()),
            ("direction", "desc".to_string()),
        ];
        query.extend(page_query(page));

        let prs: Vec<ApiPullRequest> = self
            .get_json(&format!("repos/{}/{}/pulls", repo.owner, repo.name), &query)
            .await?;
        Ok(prs.into_iter().map(PrSummary::from).collect())
    }

    async fn pull_request(&self, pr: &PrRef) -> Result<PrDetail, ForgeError> {
        let detail: ApiPullRequest = self.get_json(&pr_path(pr), &[]).await?;
        Ok(detail.into())
    }

    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        let comments: Vec<ApiComment> = self.get_all(&format!("{}/comments", pr_path(pr))).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, ForgeError> {
        let path = format!(
            "repos/{}/{}/issues/{}/comments",
            pr.repo.owner, pr.repo.name, pr.number
        );
        let comments: Vec<ApiComment> = self.get_all(&path).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>, ForgeError> {
        let reviews: Vec<ApiReview> = self.get_all(&format!("{}/reviews", pr_path(pr))).await?;
        Ok(reviews.into_iter().map(Review::from).collect())
    }
}
