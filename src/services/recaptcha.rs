use crate::errors::ServiceError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// reCAPTCHA v3 server-side verification.
///
/// Disabled entirely when no secret is configured (local development). When
/// enabled, every failure mode — missing token, transport error, timeout,
/// provider-side rejection, low score — fails closed with the same generic
/// verification error.
#[derive(Clone)]
pub struct RecaptchaService {
    http: reqwest::Client,
    secret: Option<String>,
    score_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl RecaptchaService {
    pub fn new(
        secret: Option<String>,
        score_threshold: f64,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            secret,
            score_threshold,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub async fn verify(&self, token: Option<&str>) -> Result<(), ServiceError> {
        let Some(secret) = &self.secret else {
            debug!("reCAPTCHA not configured, skipping verification");
            return Ok(());
        };

        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!("Checkout request missing reCAPTCHA token");
                return Err(ServiceError::VerificationFailed);
            }
        };

        let response = self
            .http
            .post(SITEVERIFY_URL)
            .form(&[("secret", secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| {
                warn!("reCAPTCHA verification request failed: {}", e);
                ServiceError::VerificationFailed
            })?;

        let body: SiteverifyResponse = response.json().await.map_err(|e| {
            warn!("reCAPTCHA verification response unreadable: {}", e);
            ServiceError::VerificationFailed
        })?;

        if !body.success {
            warn!(error_codes = ?body.error_codes, "reCAPTCHA verification failed");
            return Err(ServiceError::VerificationFailed);
        }

        let score = body.score.unwrap_or(0.0);
        if score < self.score_threshold {
            warn!(score, threshold = self.score_threshold, "reCAPTCHA score too low");
            return Err(ServiceError::VerificationFailed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verification_is_skipped_when_unconfigured() {
        let service =
            RecaptchaService::new(None, 0.5, Duration::from_secs(1)).expect("client builds");
        assert!(!service.is_enabled());
        assert!(service.verify(None).await.is_ok());
        assert!(service.verify(Some("anything")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_token_fails_closed_when_configured() {
        let service = RecaptchaService::new(Some("secret".into()), 0.5, Duration::from_secs(1))
            .expect("client builds");
        assert!(matches!(
            service.verify(None).await,
            Err(ServiceError::VerificationFailed)
        ));
        assert!(matches!(
            service.verify(Some("")).await,
            Err(ServiceError::VerificationFailed)
        ));
    }
}
