//! Health probe implementations and their results.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::HealthCheckConfig;

mod http;

pub use http::HttpCheck;

pub type DynCheck = Arc<dyn Check>;

/// A single health probe against one target.
#[async_trait]
pub trait Check: Send + Sync {
    /// Run the probe once. Never fails at the call level; problems are
    /// reported through [`CheckResult::error`] so the debouncer can count
    /// them like any other observation.
    async fn check(&self) -> CheckResult;

    fn config(&self) -> &HealthCheckConfig;
}

/// Outcome of one probe execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    /// What went wrong, if anything. The check is healthy iff this is `None`.
    pub error: Option<String>,

    /// HTTP status code of the response, when one was received.
    pub status_code: Option<u16>,

    /// Leaf certificate details for TLS responses.
    pub tls: Option<CertificateInfo>,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Details of the leaf certificate presented on a TLS connection. The leaf
/// is the one that matters for expiry monitoring; the chain is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
}

impl CertificateInfo {
    pub fn expires_within(&self, window: ChronoDuration) -> bool {
        Utc::now() + window > self.not_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_iff_no_error() {
        assert!(CheckResult::ok().healthy());
        assert!(!CheckResult::failure("boom").healthy());

        let with_status = CheckResult {
            error: Some("unexpected status code: 503".into()),
            status_code: Some(503),
            tls: None,
        };
        assert!(!with_status.healthy());
    }

    #[test]
    fn certificate_expiry_window() {
        let cert = CertificateInfo {
            not_before: Utc::now() - ChronoDuration::days(30),
            not_after: Utc::now() + ChronoDuration::days(10),
            dns_names: vec!["example.com".into()],
        };
        assert!(cert.expires_within(ChronoDuration::days(14)));
        assert!(!cert.expires_within(ChronoDuration::days(7)));
    }
}
