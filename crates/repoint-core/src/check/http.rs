use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::X509;
use reqwest::Method;
use tracing::{error, warn};

use crate::check::{CertificateInfo, Check, CheckResult};
use crate::config::HealthCheckConfig;

/// Probes one target address over HTTP or HTTPS.
///
/// The URL carries the configured virtual host (or the target itself when no
/// host is set) so that the Host header and the TLS SNI match what the
/// server's certificate is issued for, while DNS resolution for that host is
/// pinned to the target address. This mirrors what a request through the
/// floating IP would look like.
pub struct HttpCheck {
    cfg: HealthCheckConfig,
    target: IpAddr,
    client: reqwest::Client,
}

impl HttpCheck {
    pub fn new(cfg: HealthCheckConfig, target: IpAddr) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .tls_info(true);
        if let Some(host) = cfg.host.as_deref() {
            builder = builder.resolve(host, SocketAddr::new(target, cfg.port_or_default()));
        }
        let client = builder.build()?;

        Ok(Self {
            cfg,
            target,
            client,
        })
    }

    fn host_value(&self) -> String {
        match self.cfg.host.as_deref() {
            Some(host) => host.to_string(),
            None => match self.target {
                IpAddr::V4(addr) => addr.to_string(),
                IpAddr::V6(addr) => format!("[{addr}]"),
            },
        }
    }

    fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.cfg.kind.scheme(),
            self.host_value(),
            self.cfg.port_or_default(),
            self.cfg.path
        )
    }

    fn log_certificate_expiry(&self, certificate: &CertificateInfo) {
        if !certificate.expires_within(ChronoDuration::days(14)) {
            return;
        }
        if certificate.expires_within(ChronoDuration::days(7)) {
            error!(
                check_id = %self.cfg.id,
                host = %self.host_value(),
                target = %self.target,
                dns_names = ?certificate.dns_names,
                expires_at = %certificate.not_after,
                "TLS certificate expires soon"
            );
        } else {
            warn!(
                check_id = %self.cfg.id,
                host = %self.host_value(),
                target = %self.target,
                dns_names = ?certificate.dns_names,
                expires_at = %certificate.not_after,
                "TLS certificate expires soon"
            );
        }
    }
}

#[async_trait]
impl Check for HttpCheck {
    async fn check(&self) -> CheckResult {
        let method = match Method::from_bytes(self.cfg.method_or_default().as_bytes()) {
            Ok(method) => method,
            Err(err) => return CheckResult::failure(format!("failed to create request: {err}")),
        };

        let response = match self.client.request(method, self.url()).send().await {
            Ok(response) => response,
            Err(err) => return CheckResult::failure(format!("failed to perform request: {err}")),
        };

        let status = response.status();
        let tls = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .and_then(leaf_certificate_info);
        if let Some(certificate) = &tls {
            self.log_certificate_expiry(certificate);
        }

        let mut result = CheckResult {
            error: None,
            status_code: Some(status.as_u16()),
            tls,
        };
        if !(200..300).contains(&status.as_u16()) {
            result.error = Some(format!("unexpected status code: {}", status.as_u16()));
        }
        result
    }

    fn config(&self) -> &HealthCheckConfig {
        &self.cfg
    }
}

fn leaf_certificate_info(der: &[u8]) -> Option<CertificateInfo> {
    let certificate = X509::from_der(der).ok()?;
    let not_before = asn1_to_datetime(certificate.not_before())?;
    let not_after = asn1_to_datetime(certificate.not_after())?;
    let dns_names = certificate
        .subject_alt_names()
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.dnsname().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(CertificateInfo {
        not_before,
        not_after,
        dns_names,
    })
}

fn asn1_to_datetime(time: &Asn1TimeRef) -> Option<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).ok()?;
    let diff = epoch.diff(time).ok()?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckKind;
    use crate::test_support::check_config;
    use httpmock::prelude::*;
    use std::net::Ipv4Addr;

    fn local_check(server: &MockServer, path: &str) -> HttpCheck {
        let mut cfg = check_config("web", CheckKind::Http);
        cfg.port = server.port();
        cfg.path = path.into();
        HttpCheck::new(cfg, IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("check")
    }

    #[tokio::test]
    async fn success_status_is_healthy() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(204);
            })
            .await;

        let result = local_check(&server, "/healthz").check().await;
        mock.assert_async().await;
        assert!(result.healthy(), "unexpected error: {:?}", result.error);
        assert_eq!(result.status_code, Some(204));
        assert!(result.tls.is_none());
    }

    #[tokio::test]
    async fn non_2xx_status_is_unhealthy_but_captured() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(503);
            })
            .await;

        let result = local_check(&server, "/healthz").check().await;
        assert!(!result.healthy());
        assert_eq!(result.status_code, Some(503));
        assert_eq!(
            result.error.as_deref(),
            Some("unexpected status code: 503")
        );
    }

    #[tokio::test]
    async fn connection_failure_reports_transport_error() {
        let mut cfg = check_config("web", CheckKind::Http);
        // Reserved TEST-NET-1 address, nothing listens there.
        cfg.port = 9;
        cfg.timeout_secs = 1;
        let check = HttpCheck::new(cfg, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))).expect("check");

        let result = check.check().await;
        assert!(!result.healthy());
        assert!(result.status_code.is_none());
        assert!(
            result
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("failed to perform request"),
            "unexpected error: {:?}",
            result.error
        );
    }

    #[tokio::test]
    async fn virtual_host_is_sent_while_connecting_to_target() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/healthz")
                    .header("host", format!("check.example.com:{}", server.port()));
                then.status(200);
            })
            .await;

        let mut cfg = check_config("web", CheckKind::Http);
        cfg.host = Some("check.example.com".into());
        cfg.port = server.port();
        let check = HttpCheck::new(cfg, IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("check");

        let result = check.check().await;
        mock.assert_async().await;
        assert!(result.healthy(), "unexpected error: {:?}", result.error);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(200)
                    .delay(std::time::Duration::from_millis(1500));
            })
            .await;

        let mut cfg = check_config("web", CheckKind::Http);
        cfg.port = server.port();
        cfg.timeout_secs = 1;
        let check = HttpCheck::new(cfg, IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("check");

        let result = check.check().await;
        assert!(!result.healthy());
    }

    #[tokio::test]
    async fn configured_method_is_used() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::HEAD).path("/healthz");
                then.status(200);
            })
            .await;

        let mut cfg = check_config("web", CheckKind::Http);
        cfg.method = "HEAD".into();
        cfg.port = server.port();
        let check = HttpCheck::new(cfg, IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("check");

        let result = check.check().await;
        mock.assert_async().await;
        assert!(result.healthy(), "unexpected error: {:?}", result.error);
    }
}
