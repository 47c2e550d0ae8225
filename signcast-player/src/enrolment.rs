//! One-time enrolment: find a server, redeem the access code, persist the
//! binding. All later requests key on the stored code.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::api::{ApiClient, DiscoverInfo};
use crate::config::{PlayerConfig, PlayerPaths};
use crate::{PlayerError, Result};

/// Ports probed during discovery, in order.
const DISCOVER_PORTS: [u16; 2] = [8000, 8080];
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DiscoveredServer {
    pub url: String,
    pub name: String,
    pub version: String,
}

/// Probe well-known local addresses for a running server. Localhost first:
/// a co-hosted server answers instantly and is almost always the one meant.
pub async fn discover_servers() -> Vec<DiscoveredServer> {
    let mut found = Vec::new();
    let mut seen_names = std::collections::HashSet::new();

    for host in ["localhost", "127.0.0.1"] {
        for port in DISCOVER_PORTS {
            let url = format!("http://{host}:{port}");
            if let Some(server) = probe(&url).await {
                if seen_names.insert((server.name.clone(), port)) {
                    found.push(server);
                }
            }
        }
        if !found.is_empty() {
            break;
        }
    }
    found
}

async fn probe(url: &str) -> Option<DiscoveredServer> {
    #[derive(Deserialize)]
    struct Probe {
        name: String,
        version: String,
    }

    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .ok()?;
    let response = client.get(format!("{url}/discover")).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let info: Probe = response.json().await.ok()?;
    Some(DiscoveredServer {
        url: url.to_string(),
        name: info.name,
        version: info.version,
    })
}

/// Validate that `server_url` answers `/discover` like a signage server.
pub async fn test_server(server_url: &str) -> Result<DiscoverInfo> {
    ApiClient::new(server_url)?.discover().await
}

/// Redeem `access_code` against `server_url` and persist the binding in
/// `config.json`. Idempotent server-side; re-running overwrites locally.
pub async fn enrol(
    paths: &PlayerPaths,
    config: &mut PlayerConfig,
    server_url: &str,
    access_code: &str,
) -> Result<()> {
    if access_code.len() != 6 || !access_code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PlayerError::Config(
            "Access code must be exactly six digits".to_string(),
        ));
    }

    let api = ApiClient::new(server_url)?;
    let reply = api.register(access_code).await?;
    if !reply.success {
        return Err(PlayerError::Config("Registration rejected".to_string()));
    }

    info!(
        device_name = %reply.device_name,
        device_id = reply.device_id,
        "Enrolled with server"
    );

    config.server_url = api.base_url().to_string();
    config.access_code = Some(access_code.to_string());
    config.device_name = Some(reply.device_name);
    config.save(&paths.config_file())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_enrol_persists_binding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/player/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "device_name": "lobby",
                "device_id": 3
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = PlayerPaths::new(dir.path());
        let mut config = PlayerConfig::default();

        enrol(&paths, &mut config, &server.uri(), "004211")
            .await
            .unwrap();

        assert!(config.is_enrolled());
        assert_eq!(config.device_name.as_deref(), Some("lobby"));

        let reloaded = PlayerConfig::load(&paths.config_file());
        assert_eq!(reloaded.access_code.as_deref(), Some("004211"));
    }

    #[tokio::test]
    async fn test_enrol_rejects_malformed_code_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PlayerPaths::new(dir.path());
        let mut config = PlayerConfig::default();

        let err = enrol(&paths, &mut config, "http://127.0.0.1:9", "12345")
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
        assert!(!config.is_enrolled());
    }

    #[tokio::test]
    async fn test_enrol_surfaces_unknown_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/player/register"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "Unknown access code", "status": 404})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = PlayerPaths::new(dir.path());
        let mut config = PlayerConfig::default();

        let err = enrol(&paths, &mut config, &server.uri(), "999999")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
