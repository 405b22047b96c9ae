//! Hetzner Cloud adapter: lists servers and floating IPs by label selector
//! and repoints floating IPs through the assign action.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use repoint_core::config::{GroupConfig, HetznerConfig};
use repoint_core::provider::{Provider, ProviderError, ProviderName};
use repoint_core::resource::{FloatingIp, Group, Server};

const DEFAULT_BASE_URL: &str = "https://api.hetzner.cloud/v1";
const PAGE_SIZE: u32 = 50;

#[derive(Debug)]
pub struct HetznerProvider {
    cfg: HetznerConfig,
    readonly: bool,
    client: reqwest::Client,
    base_url: String,
}

impl HetznerProvider {
    pub fn new(group: &GroupConfig) -> anyhow::Result<Self> {
        let Some(cfg) = group.hetzner.clone() else {
            anyhow::bail!("group {}: hetzner configuration is missing", group.id);
        };
        if cfg.api_token.trim().is_empty() {
            anyhow::bail!("group {}: hetzner API token is required", group.id);
        }

        let base_url = cfg
            .api_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            cfg,
            readonly: group.readonly,
            client: reqwest::Client::new(),
            base_url,
        })
    }

    /// Point the adapter at a different API endpoint; used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_page<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        label_selector: &str,
        page: u32,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.cfg.api_token)
            .query(&[
                ("label_selector", label_selector),
                ("page", &page.to_string()),
                ("per_page", &PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(
                format!("GET {path}"),
                anyhow::anyhow!("status {status}, body: {body}"),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::api(format!("GET {path}"), err))
    }

    async fn list_servers(&self) -> Result<Vec<Server>, ProviderError> {
        let mut servers = Vec::new();
        let mut page = 1;
        loop {
            let response: ServersResponse = self
                .get_page("/servers", &self.cfg.servers.label_selector, page)
                .await?;
            for api_server in response.servers {
                servers.push(api_server.into_server()?);
            }
            match response.meta.and_then(|meta| meta.pagination.next_page) {
                Some(next) => page = next,
                None => return Ok(servers),
            }
        }
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>, ProviderError> {
        let mut floating_ips = Vec::new();
        let mut page = 1;
        loop {
            let response: FloatingIpsResponse = self
                .get_page("/floating_ips", &self.cfg.floating_ips.label_selector, page)
                .await?;
            for api_flip in response.floating_ips {
                floating_ips.push(api_flip.into_floating_ip()?);
            }
            match response.meta.and_then(|meta| meta.pagination.next_page) {
                Some(next) => page = next,
                None => return Ok(floating_ips),
            }
        }
    }
}

#[async_trait]
impl Provider for HetznerProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Hetzner
    }

    async fn poll(&self) -> Result<Group, ProviderError> {
        let (servers, floating_ips) =
            tokio::try_join!(self.list_servers(), self.list_floating_ips())?;
        Ok(Group {
            servers,
            floating_ips,
        })
    }

    async fn assign_floating_ip(
        &self,
        floating_ip: &FloatingIp,
        server: &Server,
    ) -> Result<(), ProviderError> {
        // Checked by the controller as well, but refusing here too keeps a
        // misconfigured caller from mutating anything.
        if self.readonly {
            return Err(ProviderError::ReadOnly);
        }
        if floating_ip.provider != self.name() || server.provider != self.name() {
            return Err(ProviderError::WrongProvider);
        }

        let server_id: i64 = server
            .id
            .parse()
            .map_err(|err| ProviderError::api("assign floating IP", anyhow::Error::new(err)))?;
        let url = format!(
            "{}/floating_ips/{}/actions/assign",
            self.base_url, floating_ip.id
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.cfg.api_token)
            .json(&json!({ "server": server_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(
                "assign floating IP",
                anyhow::anyhow!("status {status}, body: {body}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Meta {
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: String,
    network_zone: String,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<ApiServer>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct ApiServer {
    id: i64,
    name: String,
    datacenter: ApiDatacenter,
    public_net: ApiPublicNet,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiDatacenter {
    location: ApiLocation,
}

#[derive(Debug, Deserialize)]
struct ApiPublicNet {
    ipv4: Option<ApiAddress>,
    ipv6: Option<ApiAddress>,
}

#[derive(Debug, Deserialize)]
struct ApiAddress {
    ip: String,
}

impl ApiServer {
    fn into_server(self) -> Result<Server, ProviderError> {
        let public_ipv4 = match &self.public_net.ipv4 {
            Some(address) => Some(address.ip.parse::<Ipv4Addr>().map_err(|err| {
                ProviderError::api(
                    format!("server {}: invalid IPv4 address {}", self.id, address.ip),
                    anyhow::Error::new(err),
                )
            })?),
            None => None,
        };
        let public_ipv6 = match &self.public_net.ipv6 {
            Some(address) => first_ipv6_host(&address.ip).map(Some).ok_or_else(|| {
                ProviderError::api(
                    format!("server {}: invalid IPv6 network {}", self.id, address.ip),
                    anyhow::anyhow!("failed to derive host address"),
                )
            })?,
            None => None,
        };

        Ok(Server {
            provider: ProviderName::Hetzner,
            id: self.id.to_string(),
            name: self.name,
            location: self.datacenter.location.name,
            network_zone: self.datacenter.location.network_zone,
            resource_index: resource_index_from_labels(&self.labels),
            public_ipv4,
            public_ipv6,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FloatingIpsResponse {
    floating_ips: Vec<ApiFloatingIp>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct ApiFloatingIp {
    id: i64,
    name: String,
    ip: String,
    home_location: ApiLocation,
    server: Option<i64>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl ApiFloatingIp {
    fn into_floating_ip(self) -> Result<FloatingIp, ProviderError> {
        // IPv4 floating IPs come as a plain address, IPv6 ones as a network.
        let address = if let Ok(addr) = self.ip.parse::<IpAddr>() {
            addr
        } else {
            first_ipv6_host(&self.ip).map(IpAddr::V6).ok_or_else(|| {
                ProviderError::api(
                    format!("floating IP {}: invalid address {}", self.id, self.ip),
                    anyhow::anyhow!("failed to parse"),
                )
            })?
        };

        Ok(FloatingIp {
            provider: ProviderName::Hetzner,
            id: self.id.to_string(),
            name: self.name,
            location: self.home_location.name,
            network_zone: self.home_location.network_zone,
            address,
            current_target: self.server.map(|id| id.to_string()),
            resource_index: resource_index_from_labels(&self.labels),
        })
    }
}

/// The address servers are actually reachable at inside a routed IPv6
/// network is the first host address, e.g. `2001:db8:1::1` for
/// `2001:db8:1::/64`. A /128 entry is returned as-is.
fn first_ipv6_host(network: &str) -> Option<Ipv6Addr> {
    let (addr, prefix_len) = match network.split_once('/') {
        Some((addr, len)) => (addr, len.parse::<u8>().ok()?),
        None => (network, 128),
    };
    let base = addr.parse::<Ipv6Addr>().ok()?;
    if prefix_len > 128 {
        return None;
    }
    if prefix_len == 128 {
        return Some(base);
    }
    u128::from(base).checked_add(1).map(Ipv6Addr::from)
}

fn resource_index_from_labels(labels: &HashMap<String, String>) -> i64 {
    let Some(index) = labels.get("resource_index") else {
        return -1;
    };
    index.parse().unwrap_or_else(|_| {
        warn!(value = %index, "ignoring unparsable resource_index label");
        -1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use repoint_core::config::{HetznerSelector, ProviderKind};
    use repoint_core::resource::Identified;

    fn group_config() -> GroupConfig {
        GroupConfig {
            id: "g1".into(),
            display_name: "Group 1".into(),
            readonly: false,
            poll_interval_secs: 0,
            poll_timeout_secs: 0,
            plan_apply_timeout_secs: 0,
            plan_apply_with_unknown_status: false,
            provider: ProviderKind::Hetzner,
            hetzner: Some(HetznerConfig {
                api_token: "secret-token".into(),
                project_id: "123456".into(),
                api_endpoint: None,
                floating_ips: HetznerSelector {
                    label_selector: "role=lb".into(),
                },
                servers: HetznerSelector {
                    label_selector: "role=web".into(),
                },
            }),
            checks: vec![],
        }
    }

    fn provider_for(server: &MockServer) -> HetznerProvider {
        HetznerProvider::new(&group_config())
            .expect("provider")
            .with_base_url(server.base_url())
    }

    fn server_body(id: i64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "datacenter": {"location": {"name": "nbg1", "network_zone": "eu-central"}},
            "public_net": {
                "ipv4": {"ip": "192.0.2.10"},
                "ipv6": {"ip": "2001:db8:1::/64"}
            },
            "labels": {"resource_index": "2"}
        })
    }

    #[tokio::test]
    async fn poll_maps_servers_and_floating_ips() {
        let api = MockServer::start_async().await;
        let servers_mock = api
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/servers")
                    .query_param("label_selector", "role=web")
                    .header("authorization", "Bearer secret-token");
                then.status(200).json_body(json!({
                    "servers": [server_body(42, "web-1")],
                    "meta": {"pagination": {"next_page": null}}
                }));
            })
            .await;
        let flips_mock = api
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/floating_ips")
                    .query_param("label_selector", "role=lb");
                then.status(200).json_body(json!({
                    "floating_ips": [
                        {
                            "id": 7,
                            "name": "lb-v4",
                            "ip": "198.51.100.7",
                            "home_location": {"name": "nbg1", "network_zone": "eu-central"},
                            "server": 42,
                            "labels": {"resource_index": "2"}
                        },
                        {
                            "id": 8,
                            "name": "lb-v6",
                            "ip": "2001:db8:2::/64",
                            "home_location": {"name": "nbg1", "network_zone": "eu-central"},
                            "server": null,
                            "labels": {}
                        }
                    ],
                    "meta": {"pagination": {"next_page": null}}
                }));
            })
            .await;

        let group = provider_for(&api).poll().await.expect("poll");
        servers_mock.assert_async().await;
        flips_mock.assert_async().await;

        assert_eq!(group.servers.len(), 1);
        let server = &group.servers[0];
        assert_eq!(server.id(), "42");
        assert_eq!(server.location, "nbg1");
        assert_eq!(server.resource_index, 2);
        assert_eq!(server.public_ipv4, Some("192.0.2.10".parse().unwrap()));
        assert_eq!(server.public_ipv6, Some("2001:db8:1::1".parse().unwrap()));

        assert_eq!(group.floating_ips.len(), 2);
        let v4 = &group.floating_ips[0];
        assert_eq!(v4.current_target.as_deref(), Some("42"));
        assert_eq!(v4.address, "198.51.100.7".parse::<IpAddr>().unwrap());
        let v6 = &group.floating_ips[1];
        assert_eq!(v6.current_target, None);
        assert_eq!(v6.resource_index, -1);
        assert_eq!(v6.address, "2001:db8:2::1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn poll_follows_pagination() {
        let api = MockServer::start_async().await;
        api.mock_async(|when, then| {
            when.method(GET).path("/servers").query_param("page", "1");
            then.status(200).json_body(json!({
                "servers": [server_body(1, "web-1")],
                "meta": {"pagination": {"next_page": 2}}
            }));
        })
        .await;
        api.mock_async(|when, then| {
            when.method(GET).path("/servers").query_param("page", "2");
            then.status(200).json_body(json!({
                "servers": [server_body(2, "web-2")],
                "meta": {"pagination": {"next_page": null}}
            }));
        })
        .await;
        api.mock_async(|when, then| {
            when.method(GET).path("/floating_ips");
            then.status(200)
                .json_body(json!({"floating_ips": [], "meta": null}));
        })
        .await;

        let group = provider_for(&api).poll().await.expect("poll");
        let ids: Vec<_> = group.servers.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn api_errors_surface_with_context() {
        let api = MockServer::start_async().await;
        api.mock_async(|when, then| {
            when.method(GET).path("/servers");
            then.status(401).body("{\"error\":{\"code\":\"unauthorized\"}}");
        })
        .await;
        api.mock_async(|when, then| {
            when.method(GET).path("/floating_ips");
            then.status(200)
                .json_body(json!({"floating_ips": [], "meta": null}));
        })
        .await;

        let err = provider_for(&api).poll().await.expect_err("unauthorized");
        assert!(err.to_string().contains("GET /servers"));
    }

    #[tokio::test]
    async fn assign_posts_the_server_id() {
        let api = MockServer::start_async().await;
        let assign_mock = api
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/floating_ips/7/actions/assign")
                    .header("authorization", "Bearer secret-token")
                    .json_body(json!({"server": 42}));
                then.status(201).json_body(json!({"action": {"id": 1}}));
            })
            .await;

        let provider = provider_for(&api);
        let flip = FloatingIp {
            provider: ProviderName::Hetzner,
            id: "7".into(),
            name: "lb-v4".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            address: "198.51.100.7".parse().unwrap(),
            current_target: None,
            resource_index: -1,
        };
        let server = Server {
            provider: ProviderName::Hetzner,
            id: "42".into(),
            name: "web-1".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            resource_index: -1,
            public_ipv4: None,
            public_ipv6: None,
        };

        provider
            .assign_floating_ip(&flip, &server)
            .await
            .expect("assign");
        assign_mock.assert_async().await;
    }

    #[tokio::test]
    async fn assign_rejects_foreign_resources() {
        let api = MockServer::start_async().await;
        let provider = provider_for(&api);

        let mut flip = FloatingIp {
            provider: ProviderName::Mock,
            id: "7".into(),
            name: "lb".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            address: "198.51.100.7".parse().unwrap(),
            current_target: None,
            resource_index: -1,
        };
        let server = Server {
            provider: ProviderName::Hetzner,
            id: "42".into(),
            name: "web-1".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            resource_index: -1,
            public_ipv4: None,
            public_ipv6: None,
        };

        let err = provider
            .assign_floating_ip(&flip, &server)
            .await
            .expect_err("foreign floating IP");
        assert!(matches!(err, ProviderError::WrongProvider));

        flip.provider = ProviderName::Hetzner;
        let mut foreign_server = server;
        foreign_server.provider = ProviderName::Mock;
        let err = provider
            .assign_floating_ip(&flip, &foreign_server)
            .await
            .expect_err("foreign server");
        assert!(matches!(err, ProviderError::WrongProvider));
    }

    #[tokio::test]
    async fn readonly_provider_refuses_to_assign() {
        let api = MockServer::start_async().await;
        let mut cfg = group_config();
        cfg.readonly = true;
        let provider = HetznerProvider::new(&cfg)
            .expect("provider")
            .with_base_url(api.base_url());

        let flip = FloatingIp {
            provider: ProviderName::Hetzner,
            id: "7".into(),
            name: "lb".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            address: "198.51.100.7".parse().unwrap(),
            current_target: None,
            resource_index: -1,
        };
        let server = Server {
            provider: ProviderName::Hetzner,
            id: "42".into(),
            name: "web-1".into(),
            location: "nbg1".into(),
            network_zone: "eu-central".into(),
            resource_index: -1,
            public_ipv4: None,
            public_ipv6: None,
        };

        let err = provider
            .assign_floating_ip(&flip, &server)
            .await
            .expect_err("read-only");
        assert!(matches!(err, ProviderError::ReadOnly));
    }

    #[test]
    fn first_ipv6_host_derivation() {
        assert_eq!(
            first_ipv6_host("2001:db8:1::/64"),
            Some("2001:db8:1::1".parse().unwrap())
        );
        assert_eq!(
            first_ipv6_host("2001:db8:1::5/128"),
            Some("2001:db8:1::5".parse().unwrap())
        );
        assert_eq!(
            first_ipv6_host("2001:db8:1::5"),
            Some("2001:db8:1::5".parse().unwrap())
        );
        assert_eq!(first_ipv6_host("not-an-address"), None);
    }

    #[test]
    fn resource_index_label_parsing() {
        let mut labels = HashMap::new();
        assert_eq!(resource_index_from_labels(&labels), -1);

        labels.insert("resource_index".into(), "3".into());
        assert_eq!(resource_index_from_labels(&labels), 3);

        labels.insert("resource_index".into(), "three".into());
        assert_eq!(resource_index_from_labels(&labels), -1);
    }
}
