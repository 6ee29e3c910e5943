//! Docker discovery over the local daemon socket.
//!
//! Polls `GET /containers/json` on `/var/run/docker.sock` and synthesizes one
//! route per container carrying the `maegashira.*` labels. The container's
//! first name is its service name; containers without a usable name, public
//! hostname, private port or network address are skipped.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;

use crate::error::{ProxyError, Result};
use crate::routing::schema::{ForwardTarget, Route, RoutingTable, Target};

pub const LABEL_HOSTNAME: &str = "maegashira.public.hostname";
pub const LABEL_PATH: &str = "maegashira.public.path";
pub const LABEL_PORT: &str = "maegashira.private.port";

/// Subset of the Docker `ContainerSummary` shape we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Names", default)]
    pub names: Vec<String>,

    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,

    #[serde(rename = "NetworkSettings", default)]
    pub network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "Networks", default)]
    pub networks: HashMap<String, Network>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

/// Minimal client for the Docker Engine API over a Unix socket.
pub struct DockerClient {
    socket: PathBuf,
}

impl DockerClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let stream = UnixStream::connect(&self.socket).await?;
        let io = TokioIo::new(stream);
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProxyError::Discovery(format!("docker handshake: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Docker connection closed");
            }
        });

        let request = hyper::Request::builder()
            .uri("/containers/json")
            .header(hyper::header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProxyError::Discovery(format!("docker request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ProxyError::Discovery(format!("docker request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProxyError::Discovery(format!(
                "docker responded with {}",
                response.status()
            )));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::Discovery(format!("docker response body: {e}")))?
            .to_bytes();

        serde_json::from_slice(&body)
            .map_err(|e| ProxyError::Discovery(format!("docker response parse: {e}")))
    }
}

/// Synthesize a candidate table from the current container set.
pub fn routes_from_containers(containers: &[ContainerSummary]) -> RoutingTable {
    let mut routes = Vec::new();

    for container in containers {
        let Some(service) = service_name(container) else {
            tracing::debug!(container = %container.id, "Container has no name, skipping");
            continue;
        };
        let Some(hostname) = container.labels.get(LABEL_HOSTNAME) else {
            continue;
        };
        let path = container
            .labels
            .get(LABEL_PATH)
            .cloned()
            .unwrap_or_default();

        let Some(port) = container
            .labels
            .get(LABEL_PORT)
            .and_then(|p| p.parse::<u16>().ok())
        else {
            tracing::warn!(
                container = %service,
                "Container is labelled for proxying but has no usable private port"
            );
            continue;
        };

        let Some(ip) = container_address(container) else {
            tracing::warn!(container = %service, "Container has no network address, skipping");
            continue;
        };

        routes.push(Route {
            hostname: hostname.clone(),
            path,
            timeout_ms: None,
            middlewares: None,
            load_balancing: None,
            authentication: None,
            cache: None,
            targets: vec![Target::Forward(ForwardTarget {
                url: format!("http://{ip}:{port}"),
            })],
        });
        tracing::debug!(
            container = %service,
            hostname = %hostname,
            upstream_port = port,
            "Discovered route"
        );
    }

    RoutingTable::new(routes)
}

fn service_name(container: &ContainerSummary) -> Option<String> {
    container
        .names
        .first()
        .map(|n| n.trim_start_matches('/').to_owned())
        .filter(|n| !n.is_empty())
}

fn container_address(container: &ContainerSummary) -> Option<String> {
    container
        .network_settings
        .as_ref()?
        .networks
        .values()
        .map(|n| n.ip_address.clone())
        .find(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(
        name: &str,
        labels: &[(&str, &str)],
        ip: &str,
    ) -> ContainerSummary {
        ContainerSummary {
            id: format!("{name}-id"),
            names: vec![format!("/{name}")],
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            network_settings: Some(NetworkSettings {
                networks: HashMap::from([(
                    "bridge".to_string(),
                    Network {
                        ip_address: ip.to_string(),
                    },
                )]),
            }),
        }
    }

    #[test]
    fn labelled_container_becomes_a_route() {
        let containers = vec![container(
            "web",
            &[
                (LABEL_HOSTNAME, "app.example.com"),
                (LABEL_PATH, "/app"),
                (LABEL_PORT, "3000"),
            ],
            "172.17.0.2",
        )];
        let table = routes_from_containers(&containers);
        assert_eq!(table.len(), 1);
        let route = &table.routes[0];
        assert_eq!(route.hostname, "app.example.com");
        assert_eq!(route.path, "/app");
        assert_eq!(
            route.targets[0],
            Target::Forward(ForwardTarget {
                url: "http://172.17.0.2:3000".into()
            })
        );
    }

    #[test]
    fn unlabelled_container_is_skipped() {
        let containers = vec![container("db", &[], "172.17.0.3")];
        assert!(routes_from_containers(&containers).is_empty());
    }

    #[test]
    fn bad_port_label_is_skipped() {
        let containers = vec![container(
            "web",
            &[
                (LABEL_HOSTNAME, "app.example.com"),
                (LABEL_PORT, "not-a-port"),
            ],
            "172.17.0.2",
        )];
        assert!(routes_from_containers(&containers).is_empty());
    }

    #[test]
    fn path_label_defaults_to_empty() {
        let containers = vec![container(
            "web",
            &[(LABEL_HOSTNAME, "app.example.com"), (LABEL_PORT, "80")],
            "172.17.0.2",
        )];
        let table = routes_from_containers(&containers);
        assert_eq!(table.routes[0].path, "");
    }

    #[test]
    fn nameless_container_is_skipped() {
        let mut summary = container(
            "web",
            &[(LABEL_HOSTNAME, "app.example.com"), (LABEL_PORT, "80")],
            "172.17.0.2",
        );
        summary.names.clear();
        assert!(routes_from_containers(&[summary]).is_empty());
    }
}
