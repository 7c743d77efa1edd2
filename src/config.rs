use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = ".pr-activity.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("GitHub App auth requires --app-id, --private-key, and --installation-id")]
    IncompleteAppCredentials,

    #[error("Invalid repository pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Settings loaded from `.pr-activity.toml`, with environment fallbacks.
///
/// Every field is optional; the tool runs with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub repositories: RepositoriesConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Falls back to `GITHUB_TOKEN`.
    pub token: Option<String>,
    /// REST API base, for GitHub Enterprise Server.
    pub api_url: Option<String>,
    pub app_id: Option<u64>,
    /// Path to the GitHub App PEM private key.
    pub private_key: Option<PathBuf>,
    pub installation_id: Option<u64>,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("app_id", &self.app_id)
            .field("private_key", &self.private_key)
            .field("installation_id", &self.installation_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per rate-limited call.
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub use_gh_cli: bool,
    /// `gh` executable to run; defaults to `gh` on `PATH`.
    pub gh_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoriesConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// How to authenticate against the REST API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    App {
        app_id: u64,
        private_key: PathBuf,
        installation_id: u64,
    },
    Anonymous,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => write!(f, "Token(<redacted>)"),
            Credentials::App {
                app_id,
                installation_id,
                ..
            } => write!(f, "App(app_id={app_id}, installation_id={installation_id})"),
            Credentials::Anonymous => write!(f, "Anonymous"),
        }
    }
}

impl Config {
    /// Load `.pr-activity.toml` from the current directory if present, then fill
    /// unset credentials from the environment.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Fill fields the file left unset from `GITHUB_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let github = &mut self.github;
        if github.token.is_none() {
            github.token = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty());
        }
        if github.app_id.is_none() {
            github.app_id = parse_env(&lookup, "GITHUB_APP_ID")?;
        }
        if github.private_key.is_none() {
            github.private_key = lookup("GITHUB_APP_PRIVATE_KEY")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from);
        }
        if github.installation_id.is_none() {
            github.installation_id = parse_env(&lookup, "GITHUB_APP_INSTALLATION_ID")?;
        }
        Ok(())
    }
}

fn parse_env(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

impl GitHubConfig {
    /// App credentials win over a token; a partial app triple is an error.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (self.app_id, &self.private_key, self.installation_id) {
            (Some(app_id), Some(private_key), Some(installation_id)) => Ok(Credentials::App {
                app_id,
                private_key: private_key.clone(),
                installation_id,
            }),
            (None, None, None) => Ok(match &self.token {
                Some(token) => Credentials::Token(token.clone()),
                None => Credentials::Anonymous,
            }),
            _ => Err(ConfigError::IncompleteAppCredentials),
        }
    }
}
