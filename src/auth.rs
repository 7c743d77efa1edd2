use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Credentials;
use crate::forge::rest::USER_AGENT;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to authenticate with token: {0}")]
    InvalidToken(String),

    #[error("Private key file not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    #[error("Failed to read private key: {0}")]
    KeyRead(#[from] std::io::Error),

    #[error("Failed to sign GitHub App JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to authenticate with GitHub App: {0}")]
    Installation(String),

    #[error("Authentication request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Resolve credentials into the bearer token the REST backend sends.
///
/// Returns `None` for anonymous access.
#[instrument(skip_all, fields(api = %api_base))]
pub async fn authenticate(
    credentials: &Credentials,
    api_base: &str,
) -> Result<Option<String>, AuthError> {
    let api_base = api_base.trim_end_matches('/');
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

    match credentials {
        Credentials::Anonymous => {
            warn!("using unauthenticated access (60 requests/hour limit)");
            Ok(None)
        }
        Credentials::Token(token) => {
            info!("authenticating with personal access token");
            let login = verify_token(&client, api_base, token).await?;
            info!(%login, "token verified");
            Ok(Some(token.clone()))
        }
        Credentials::App {
            app_id,
            private_key,
            installation_id,
        } => {
            info!(app_id, installation_id, "authenticating with GitHub App");
            let pem = read_private_key(private_key)?;
            let jwt = sign_app_jwt(*app_id, &pem)?;
            let token = installation_token(&client, api_base, &jwt, *installation_id).await?;
            info!("installation token issued");
            Ok(Some(token))
        }
    }
}

async fn verify_token(
    client: &reqwest::Client,
    api_base: &str,
    token: &str,
) -> Result<String, AuthError> {
    let response = client
        .get(format!("{api_base}/user"))
        .header(ACCEPT, "application/vnd.github+json")
        .bearer_auth(token)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::InvalidToken(error_message(response).await));
    }
    Ok(response.json::<User>().await?.login)
}

fn read_private_key(path: &Path) -> Result<Vec<u8>, AuthError> {
    if !path.exists() {
        return Err(AuthError::KeyNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

/// RS256 app JWT, backdated a minute for clock drift and valid for nine.
fn sign_app_jwt(app_id: u64, pem: &[u8]) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = AppClaims {
        iat: (now - Duration::seconds(60)).timestamp(),
        exp: (now + Duration::minutes(9)).timestamp(),
        iss: app_id.to_string(),
    };
    let key = EncodingKey::from_rsa_pem(pem)?;
    Ok(jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)?)
}

async fn installation_token(
    client: &reqwest::Client,
    api_base: &str,
    jwt: &str,
    installation_id: u64,
) -> Result<String, AuthError> {
    let response = client
        .post(format!(
            "{api_base}/app/installations/{installation_id}/access_tokens"
        ))
        .header(ACCEPT, "application/vnd.github+json")
        .bearer_auth(jwt)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AuthError::Installation(error_message(response).await));
    }
    Ok(response.json::<InstallationToken>().await?.token)
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => message,
        _ => format!("{status}: {message}"),
    }
}
