use chrono::{DateTime, Utc};

/// Identifies a repository as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// A pull request inside this repository.
    pub fn pull(&self, number: u64) -> PrRef {
        PrRef {
            repo: self.clone(),
            number,
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Identifies a single pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl std::fmt::Display for PrRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// One entry of a repository's pull request listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Closed,
}

/// Full metadata for one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrDetail {
    pub number: u64,
    pub title: String,
    /// Login of the author; absent for deleted ("ghost") accounts.
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: PrState,
    pub merged: bool,
    pub merged_by: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// An inline review comment or a conversation comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub actor: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDisposition {
    Approved,
    ChangesRequested,
    Commented,
    Other,
}

impl ReviewDisposition {
    /// Map the upstream review state (`APPROVED`, `CHANGES_REQUESTED`, ...).
    pub fn from_state(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "APPROVED" => ReviewDisposition::Approved,
            "CHANGES_REQUESTED" => ReviewDisposition::ChangesRequested,
            "COMMENTED" => ReviewDisposition::Commented,
            _ => ReviewDisposition::Other,
        }
    }
}

/// A submitted review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub actor: Option<String>,
    /// Absent for pending reviews.
    pub submitted_at: Option<DateTime<Utc>>,
    pub disposition: ReviewDisposition,
    pub body: Option<String>,
}
