//! Delegated authentication.
//!
//! The blog service never validates tokens itself. It forwards the caller's
//! bearer token to the user service's `/verify` endpoint and turns the answer
//! into one of three outcomes: an identity, a rejection (the caller's fault,
//! 401) or an unreachable dependency (our fault, 502).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Caller identity resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Missing or invalid Authorization header")]
    MissingCredentials,

    #[error("Token rejected: {0}")]
    Rejected(String),

    #[error("Auth service unreachable: {0}")]
    Unreachable(String),
}

impl VerifyError {
    const fn outcome(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing",
            Self::Rejected(_) => "rejected",
            Self::Unreachable(_) => "unreachable",
        }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, VerifyError> {
    let value = header.ok_or(VerifyError::MissingCredentials)?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(VerifyError::MissingCredentials)?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer")
        || token.is_empty()
        || token.contains(char::is_whitespace)
    {
        return Err(VerifyError::MissingCredentials);
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    #[serde(default)]
    username: Option<String>,
}

/// Verifies tokens against `{auth_service_url}/verify`.
#[derive(Clone)]
pub struct RemoteAuthDelegate {
    client: Client,
    verify_url: Url,
}

impl RemoteAuthDelegate {
    /// `client` must carry the per-call timeout.
    pub fn new(client: Client, auth_service_url: &str) -> anyhow::Result<Self> {
        let base = format!("{}/", auth_service_url.trim_end_matches('/'));
        let verify_url = Url::parse(&base)
            .and_then(|base| base.join("verify"))
            .map_err(|e| anyhow::anyhow!("Invalid auth service URL {auth_service_url}: {e}"))?;

        Ok(Self { client, verify_url })
    }

    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    async fn call_verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let response = self
            .client
            .get(self.verify_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VerifyError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() {
                warn!(%status, "Auth service answered with a server error");
            }
            return Err(VerifyError::Rejected(format!(
                "auth service returned {}",
                status.as_u16()
            )));
        }

        let body: VerifyResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                VerifyError::Rejected("malformed verification payload".to_string())
            } else {
                VerifyError::Unreachable(e.to_string())
            }
        })?;

        if body.status != "success" {
            return Err(VerifyError::Rejected(format!(
                "verification status {}",
                body.status
            )));
        }

        match body.data.and_then(|d| d.username) {
            Some(username) if !username.trim().is_empty() => Ok(Identity { username }),
            _ => Err(VerifyError::Rejected(
                "verification payload has no username".to_string(),
            )),
        }
    }
}

#[async_trait]
impl IdentityVerifier for RemoteAuthDelegate {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let result = self.call_verify(token).await;

        let outcome = match &result {
            Ok(_) => "authorized",
            Err(e) => e.outcome(),
        };
        metrics::counter!("auth_verifications_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(identity) => debug!(username = %identity.username, "Token verified"),
            Err(VerifyError::Unreachable(reason)) => {
                warn!(url = %self.verify_url, %reason, "Token verification failed: auth service unreachable");
            }
            Err(e) => debug!(error = %e, "Token verification rejected"),
        }

        result
    }
}
