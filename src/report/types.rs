use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::activity::PrRecord;
use crate::window::DateWindow;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    Interrupted,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "COMPLETE"),
            RunStatus::Interrupted => write!(f, "PARTIAL (interrupted)"),
            RunStatus::Failed => write!(f, "PARTIAL (failed)"),
        }
    }
}

/// Repositories in the order they were recorded, serialized as a JSON object.
#[derive(Debug, Clone, Default)]
pub struct RepositoryMap(Vec<(String, Vec<PrRecord>)>);

impl RepositoryMap {
    /// Append `repo`, or replace its PRs in place if it is already present.
    pub fn insert(&mut self, repo: String, prs: Vec<PrRecord>) {
        match self.0.iter_mut().find(|(name, _)| *name == repo) {
            Some(entry) => entry.1 = prs,
            None => self.0.push((repo, prs)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &Vec<PrRecord>> {
        self.0.iter().map(|(_, prs)| prs)
    }
}

impl Serialize for RepositoryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, prs)| (name, prs)))
    }
}

/// The JSON document written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub organization: String,
    pub generated_at: DateTime<Utc>,
    pub date_range: DateWindow,
    /// Repository name to its PRs, newest-created first.
    pub repositories: RepositoryMap,
}

impl Report {
    pub fn new(organization: &str, date_range: DateWindow) -> Self {
        Self {
            organization: organization.to_string(),
            generated_at: Utc::now(),
            date_range,
            repositories: RepositoryMap::default(),
        }
    }

    pub fn pull_request_count(&self) -> usize {
        self.repositories.values().map(Vec::len).sum()
    }

    pub fn event_count(&self) -> usize {
        self.repositories
            .values()
            .flatten()
            .map(|pr| pr.events.len())
            .sum()
    }
}
