//! Anti-abuse token verification.
//!
//! [`TurnstileVerifier`] posts the token and the site secret as form fields
//! to the siteverify endpoint and trusts its `success` flag.
//! [`DisabledVerifier`] accepts everything and is meant for local runs.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::VerificationConfig;

#[async_trait]
pub trait Verifier: Send + Sync {
    /// `Ok(false)` when the service rejects the token.
    async fn verify(&self, token: &str) -> Result<bool>;
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
}

pub struct TurnstileVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl TurnstileVerifier {
    pub fn new(
        endpoint: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            secret: secret.into(),
        })
    }

    pub fn from_config(config: &VerificationConfig) -> Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .with_context(|| format!("{} environment variable not set", config.secret_env))?;
        Self::new(
            config.endpoint.clone(),
            secret,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Verifier for TurnstileVerifier {
    async fn verify(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
            .context("verification request failed")?;

        let body: SiteVerifyResponse = response
            .json()
            .await
            .context("verification response was not JSON")?;
        Ok(body.success)
    }
}

pub struct DisabledVerifier;

#[async_trait]
impl Verifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<bool> {
        Ok(true)
    }
}

pub fn create_verifier(config: &VerificationConfig) -> Result<Box<dyn Verifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledVerifier)),
        "turnstile" => Ok(Box::new(TurnstileVerifier::from_config(config)?)),
        other => anyhow::bail!("Unknown verification provider: {}", other),
    }
}
