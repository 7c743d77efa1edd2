//! JSON shapes of the GitHub REST API.
//!
//! Both backends receive the same REST payloads (directly over HTTP, or through
//! `gh api`), so they share these definitions and their conversions.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{Comment, PrDetail, PrState, PrSummary, Review, ReviewDisposition};

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRepository {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPullRequest {
    pub number: u64,
    pub title: String,
    pub user: Option<ApiUser>,
    pub created_at: DateTime<Utc>,
    pub state: String,
    /// Only present on the single pull request endpoint.
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merged_by: Option<ApiUser>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiComment {
    pub user: Option<ApiUser>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiReview {
    pub user: Option<ApiUser>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub state: String,
    pub body: Option<String>,
}

/// Error payload GitHub returns alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

impl From<ApiPullRequest> for PrSummary {
    fn from(pr: ApiPullRequest) -> Self {
        PrSummary {
            number: pr.number,
            title: pr.title,
            created_at: pr.created_at,
        }
    }
}

impl From<ApiPullRequest> for PrDetail {
    fn from(pr: ApiPullRequest) -> Self {
        let state = if pr.state.eq_ignore_ascii_case("open") {
            PrState::Open
        } else {
            PrState::Closed
        };
        // The listing endpoint omits `merged`; a merge timestamp implies it.
        let merged = pr.merged.unwrap_or(pr.merged_at.is_some());

        PrDetail {
            number: pr.number,
            title: pr.title,
            author: pr.user.map(|u| u.login),
            created_at: pr.created_at,
            state,
            merged,
            merged_by: pr.merged_by.map(|u| u.login),
            merged_at: pr.merged_at,
            closed_at: pr.closed_at,
        }
    }
}

impl From<ApiComment> for Comment {
    fn from(comment: ApiComment) -> Self {
        Comment {
            actor: comment.user.map(|u| u.login),
            created_at: comment.created_at,
        }
    }
}

impl From<ApiReview> for Review {
    fn from(review: ApiReview) -> Self {
        Review {
            actor: review.user.map(|u| u.login),
            submitted_at: review.submitted_at,
            disposition: ReviewDisposition::from_state(&review.state),
            body: review.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_pull_request_detail() {
        let pr: ApiPullRequest = serde_json::from_value(serde_json::json!({
            "number": 12,
            "title": "Add retries",
            "user": { "login": "alice" },
            "created_at": "2025-06-15T10:00:00Z",
            "state": "closed",
            "merged": true,
            "merged_by": { "login": "bob" },
            "merged_at": "2025-06-16T09:30:00Z",
            "closed_at": "2025-06-16T09:30:00Z"
        }))
        .unwrap();

        let detail = PrDetail::from(pr);
        assert_eq!(detail.state, PrState::Closed);
        assert!(detail.merged);
        assert_eq!(detail.author.as_deref(), Some("alice"));
        assert_eq!(detail.merged_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_listing_entry_without_merged_flag() {
        let pr: ApiPullRequest = serde_json::from_value(serde_json::json!({
            "number": 3,
            "title": "Docs",
            "user": null,
            "created_at": "2025-06-15T10:00:00Z",
            "state": "open",
            "merged_at": null,
            "closed_at": null
        }))
        .unwrap();

        let detail = PrDetail::from(pr);
        assert_eq!(detail.state, PrState::Open);
        assert!(!detail.merged);
        assert!(detail.author.is_none());
    }

    #[test]
    fn test_pending_review_has_no_submission_time() {
        let review: ApiReview = serde_json::from_value(serde_json::json!({
            "user": { "login": "carol" },
            "state": "PENDING",
            "body": ""
        }))
        .unwrap();

        let review = Review::from(review);
        assert!(review.submitted_at.is_none());
        assert_eq!(review.disposition, ReviewDisposition::Other);
    }
}
