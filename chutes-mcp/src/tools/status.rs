//! `check_mcp_status`: one reachability probe per backend endpoint plus the
//! quota usage API.
//!
//! Generation endpoints reject a GET with a dummy body, so an authorized,
//! reachable endpoint answers 400. Any other status is a warning.

use std::fmt;
use std::sync::Arc;

use chutes_mcp_core::{
    context::ToolContext,
    tool_text_content,
    tools::ToolHandlerFn,
    types::{Tool, ToolAnnotations, ToolResponseContent},
};
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::http::{probe_reached, Capability, ChutesClient};
use crate::AppState;

use super::{handler, tool};

pub const HEADER: &str = "MCP server instance is initialized and running.";

const PROBE_BODY: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Success,
    Warning,
    Error,
    Info,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Success => "SUCCESS",
            Tier::Warning => "WARNING",
            Tier::Error => "ERROR",
            Tier::Info => "INFO",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub component: String,
    pub tier: Tier,
    pub detail: String,
}

impl StatusEntry {
    fn new(component: impl Into<String>, tier: Tier, detail: String) -> Self {
        Self {
            component: component.into(),
            tier,
            detail,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    /// Header line followed by one `TIER: detail` line per entry.
    pub fn render(&self) -> String {
        std::iter::once(HEADER.to_string())
            .chain(
                self.entries
                    .iter()
                    .map(|entry| format!("{}: {}", entry.tier, entry.detail)),
            )
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct StatusParams {}

pub(crate) fn tools(state: &Arc<AppState>) -> Vec<(Tool, ToolHandlerFn)> {
    let hints = ToolAnnotations {
        title: Some("Check MCP Status".to_string()),
        read_only_hint: Some(true),
        open_world_hint: Some(true),
        ..Default::default()
    };
    vec![(
        tool::<StatusParams>(
            "check_mcp_status",
            "Checks if the MCP server is running and connected to its configured endpoints (LLM, Image, Music, Video).",
            Some(hints),
        ),
        handler(state, "check_mcp_status", check_mcp_status),
    )]
}

pub async fn check_mcp_status(
    state: Arc<AppState>,
    _params: StatusParams,
    ctx: ToolContext,
) -> Result<Vec<ToolResponseContent>> {
    ctx.info("Starting MCP system health check").await;
    let report = run_checks(&state.client).await;
    ctx.info("MCP system health check completed").await;
    Ok(vec![tool_text_content!(report.render())])
}

/// Probes every capability in order, then the quota API.
pub async fn run_checks(client: &ChutesClient) -> StatusReport {
    let mut report = StatusReport::default();
    for capability in Capability::ALL {
        report.entries.push(probe_endpoint(client, capability).await);
    }
    report.entries.push(probe_quota(client).await);
    report
}

async fn probe_endpoint(client: &ChutesClient, capability: Capability) -> StatusEntry {
    let Some(url) = client.endpoint(capability) else {
        return StatusEntry::new(
            capability.label(),
            Tier::Info,
            format!("{} endpoint is not configured.", capability),
        );
    };

    let (tier, detail) = match client.probe(&url, Some(PROBE_BODY)).await {
        Ok(response) if probe_reached(response.status()) => (
            Tier::Success,
            format!("{} endpoint ({}) is reachable and authorized.", capability, url),
        ),
        Ok(response) => (
            Tier::Warning,
            format!(
                "{} endpoint ({}) returned unexpected status {}. Expected 400 for reachability check.",
                capability,
                url,
                response.status().as_u16()
            ),
        ),
        Err(e) => (
            Tier::Error,
            format!("{} endpoint ({}) is unreachable. Client Error: {}", capability, url, e),
        ),
    };
    tracing::debug!("{} probe: {}", capability, tier);
    StatusEntry::new(capability.label(), tier, detail)
}

async fn probe_quota(client: &ChutesClient) -> StatusEntry {
    const COMPONENT: &str = "Quota Usage";
    if client.api_token().is_none() {
        return StatusEntry::new(
            COMPONENT,
            Tier::Info,
            "Chutes API token not configured for Quota Usage check.".to_string(),
        );
    }

    let url = client.quota_url();
    let response = match client.probe(&url, None).await {
        Ok(response) => response,
        Err(e) => {
            return StatusEntry::new(
                COMPONENT,
                Tier::Error,
                format!("Quota Usage API ({}) is unreachable. Client Error: {}", url, e),
            )
        }
    };

    let status = response.status();
    if status != StatusCode::OK {
        return StatusEntry::new(
            COMPONENT,
            Tier::Warning,
            format!("Quota Usage API ({}) returned status {}.", url, status.as_u16()),
        );
    }

    let quota = match response.text().await {
        Ok(text) => serde_json::from_str::<Value>(&text)
            .map(|json| json.to_string())
            .unwrap_or(text),
        Err(e) => {
            return StatusEntry::new(
                COMPONENT,
                Tier::Error,
                format!("Quota Usage API ({}) encountered an unexpected error: {}", url, e),
            )
        }
    };
    StatusEntry::new(
        COMPONENT,
        Tier::Success,
        format!(
            "Quota Usage API ({}) is reachable (Status: {}). Quota data: {}",
            url,
            status.as_u16(),
            quota
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(settings: Value) -> ChutesClient {
        ChutesClient::new(Arc::new(Settings::from_value(settings)), reqwest::Client::new())
    }

    #[test]
    fn test_render() {
        let report = StatusReport {
            entries: vec![
                StatusEntry::new("LLM", Tier::Success, "ok".to_string()),
                StatusEntry::new("Quota Usage", Tier::Info, "skipped".to_string()),
            ],
        };
        assert_eq!(
            report.render(),
            format!("{}\nSUCCESS: ok\nINFO: skipped", HEADER)
        );
    }

    #[tokio::test]
    async fn test_unconfigured_everything_is_info() {
        let report = run_checks(&client(json!({}))).await;
        assert_eq!(report.entries.len(), Capability::ALL.len() + 1);
        assert!(report.entries.iter().all(|e| e.tier == Tier::Info));
        assert_eq!(report.entries[0].detail, "LLM endpoint is not configured.");
        assert_eq!(
            report.render().lines().count(),
            Capability::ALL.len() + 2
        );
    }

    #[tokio::test]
    async fn test_probe_tiers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llm"))
            .and(header("authorization", "Bearer t"))
            .and(body_string("test"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/image"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quota"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "used": 3 })))
            .mount(&server)
            .await;

        let chutes = client(json!({ "chutes": {
            "api_token": "t",
            "endpoints": {
                "llm": format!("{}/llm", server.uri()),
                "text_to_image": format!("{}/image", server.uri()),
                "text_to_music": "http://127.0.0.1:1/music",
                "quota_usage": format!("{}/quota", server.uri())
            }
        }}));
        let report = run_checks(&chutes).await;
        let tiers: Vec<Tier> = report.entries.iter().map(|e| e.tier).collect();
        assert_eq!(
            tiers,
            vec![
                Tier::Success,
                Tier::Warning,
                Tier::Error,
                Tier::Info,
                Tier::Info,
                Tier::Info,
                Tier::Info,
                Tier::Success,
            ]
        );
        assert!(report.entries[1].detail.contains("unexpected status 401"));
        assert!(report.entries[7].detail.contains(r#"{"used":3}"#));
    }

    #[tokio::test]
    async fn test_quota_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let chutes = client(json!({ "chutes": {
            "api_token": "t",
            "endpoints": { "quota_usage": server.uri() }
        }}));
        let entry = probe_quota(&chutes).await;
        assert_eq!(entry.tier, Tier::Warning);
        assert!(entry.detail.ends_with("returned status 403."));
    }
}
