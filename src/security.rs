#![forbid(unsafe_code)]

//! Identity verification and process-level guards shared by the binaries.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use nix::unistd::Uid;
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::error::AuthError;

/// Fails fast when a binary is started as root. The services are expected to
/// run under an unprivileged account.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use the dramafeed service account");
    }
    Ok(())
}

/// The subset of identity claims the API hands back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "sub", alias = "user_id")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Turns an opaque bearer token into claims. Called on every protected
/// request; an implementation must not cache positive answers past the
/// provider's own revocation.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// [`IdentityVerifier`] that POSTs the token to an identity provider endpoint.
/// A 2xx JSON body is read as the claims; any other answer rejects the token.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpIdentityVerifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            endpoint: endpoint.into(),
            agent,
        }
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let bearer = format!("Bearer {token}");
        task::spawn_blocking(move || {
            match agent
                .post(&endpoint)
                .set("Authorization", &bearer)
                .call()
            {
                Ok(response) => response
                    .into_json::<Claims>()
                    .map_err(|err| AuthError::InvalidToken(format!("unreadable claims: {err}"))),
                Err(ureq::Error::Status(code, _)) => {
                    Err(AuthError::InvalidToken(format!("provider answered {code}")))
                }
                Err(err) => Err(AuthError::Provider(err.to_string())),
            }
        })
        .await
        .map_err(|err| AuthError::Provider(err.to_string()))?
    }
}
