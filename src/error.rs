//! Error kinds that callers branch on.
//!
//! Plumbing (store, config, migrations) returns `anyhow::Result`. The two
//! enums here cover the outcomes a caller has to distinguish: why a
//! submission was refused, and why an analysis produced no report.

use std::time::Duration;

use thiserror::Error;

/// Why the dispatcher refused or could not complete a submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("sign in to submit ideas")]
    Unauthorized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("verification failed")]
    VerificationFailed,

    #[error("daily submission limit reached")]
    RateLimited,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubmitError {
    /// Machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Unauthorized => "unauthorized",
            SubmitError::InvalidInput(_) => "bad_request",
            SubmitError::VerificationFailed => "verification_failed",
            SubmitError::RateLimited => "rate_limited",
            SubmitError::Internal(_) => "internal",
        }
    }
}

/// Failure kinds of one analysis invocation.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("analysis service returned no content")]
    EmptyResponse,

    #[error("analysis service returned invalid JSON: {0}")]
    InvalidResponse(String),

    #[error("analysis request failed: {0}")]
    Http(String),

    #[error("analysis provider is disabled")]
    Disabled,
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_codes() {
        assert_eq!(SubmitError::Unauthorized.code(), "unauthorized");
        assert_eq!(SubmitError::InvalidInput("x".into()).code(), "bad_request");
        assert_eq!(SubmitError::VerificationFailed.code(), "verification_failed");
        assert_eq!(SubmitError::RateLimited.code(), "rate_limited");
        let internal: SubmitError = anyhow::anyhow!("disk full").into();
        assert_eq!(internal.code(), "internal");
        assert_eq!(internal.to_string(), "disk full");
    }

    #[test]
    fn test_analysis_error_messages() {
        assert_eq!(
            AnalysisError::Timeout(Duration::from_secs(45)).to_string(),
            "analysis timed out after 45s"
        );
        assert!(AnalysisError::InvalidResponse("eof".into())
            .to_string()
            .contains("eof"));
    }
}
