pub mod types;

pub use types::{Report, RunStatus};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::Utc;
use colored::Colorize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::activity::PrRecord;
use crate::pipeline::RepositorySink;
use crate::window::DateWindow;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owns the in-memory report and rewrites the whole file after every change.
pub struct ReportWriter {
    report: Report,
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(organization: &str, window: DateWindow, path: impl Into<PathBuf>) -> Self {
        Self {
            report: Report::new(organization, window),
            path: path.into(),
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current report, replacing the previous file.
    ///
    /// The JSON goes to a sibling `.tmp` file first and is renamed into place,
    /// so readers never observe a half-written report.
    #[instrument(skip(self), fields(path = %self.path.display(), repos = self.report.repositories.len()))]
    pub fn persist(&mut self) -> Result<(), ReportError> {
        self.report.generated_at = Utc::now();
        let json = serde_json::to_string_pretty(&self.report)?;

        let staging = staging_path(&self.path);
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.path)?;
        debug!("report saved");
        Ok(())
    }
}

impl RepositorySink for ReportWriter {
    fn record(&mut self, repo: &str, prs: Vec<PrRecord>) -> Result<(), ReportError> {
        self.report.repositories.insert(repo.to_string(), prs);
        self.persist()?;
        info!(repos = self.report.repositories.len(), "saved progress");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("report"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Print a short run summary to the terminal.
pub fn print_summary(report: &Report, status: RunStatus, path: &Path) {
    println!();
    println!("Report written to {}", path.display().to_string().bold());
    println!(
        "Organization: {} | Window: {}",
        report.organization, report.date_range
    );
    println!(
        "Repositories: {} | Pull requests: {} | Events: {}",
        report.repositories.len(),
        report.pull_request_count(),
        report.event_count()
    );
    println!("═══ {} ═══", colorize_status(status));
    println!();
}

fn colorize_status(status: RunStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Complete => label.green().bold(),
        RunStatus::Interrupted => label.yellow().bold(),
        RunStatus::Failed => label.red().bold(),
    }
}
