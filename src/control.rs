use crate::config::ControlPlaneConfig;
use crate::jobs::{CommandKind, CommandStatus, NodeCommandRow, now_rfc3339};
use crate::logs::CrawlLogRow;
use crate::nodes::NodeSnapshot;
use anyhow::{Context, Result, anyhow};
use rand::{Rng, rng};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const READ_ATTEMPTS: usize = 3;

// Column list the registry exposes; mirrors the runtime_nodes table.
const NODE_COLUMNS: &str = "id,name,host,region,version,status,current_tasks,queue_size,\
                            total_completed,last_seen,latency_ms,weight";

// -------------------------
// Control-plane facade
// -------------------------

/// The one seam to the fleet's control plane. Picked once at startup; every
/// call site stays backend-agnostic.
pub enum ControlPlane {
    Rest(RestControl),
    Supabase(SupabaseControl),
}

impl ControlPlane {
    pub fn from_config(cfg: &ControlPlaneConfig) -> Result<Self> {
        match cfg {
            ControlPlaneConfig::Rest { base_url, token } => {
                Ok(ControlPlane::Rest(RestControl::new(base_url, token.as_deref())?))
            }
            ControlPlaneConfig::Supabase { base_url, service_key } => Ok(ControlPlane::Supabase(
                SupabaseControl::new(base_url, service_key)?,
            )),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            ControlPlane::Rest(_) => "rest",
            ControlPlane::Supabase(_) => "supabase",
        }
    }

    /// Current registry snapshot, unordered (ranking is the caller's concern).
    pub async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        match self {
            ControlPlane::Rest(c) => c.list_nodes().await,
            ControlPlane::Supabase(c) => c.list_nodes().await,
        }
    }

    /// Insert a pending command row for a node to pick up. Not retried: the
    /// insert is not idempotent and a duplicate command would double-run.
    pub async fn create_command(
        &self,
        node_id: i64,
        kind: CommandKind,
        payload: serde_json::Value,
    ) -> Result<NodeCommandRow> {
        match self {
            ControlPlane::Rest(c) => c.create_command(node_id, kind, payload).await,
            ControlPlane::Supabase(c) => c.create_command(node_id, kind, payload).await,
        }
    }

    /// Log rows for a job, ascending by id, optionally only past a cursor.
    pub async fn logs_since(&self, job_id: &str, after_id: Option<i64>) -> Result<Vec<CrawlLogRow>> {
        match self {
            ControlPlane::Rest(c) => c.logs_since(job_id, after_id).await,
            ControlPlane::Supabase(c) => c.logs_since(job_id, after_id).await,
        }
    }
}

#[derive(Serialize)]
struct CommandInsert {
    node_id: i64,
    command: CommandKind,
    payload: serde_json::Value,
    status: CommandStatus,
    created_at: String,
}

impl CommandInsert {
    fn new(node_id: i64, kind: CommandKind, payload: serde_json::Value) -> Self {
        Self {
            node_id,
            command: kind,
            payload,
            status: CommandStatus::Pending,
            created_at: now_rfc3339(),
        }
    }
}

// -------------------------
// Shared plumbing
// -------------------------

fn with_params(base: &str, params: &[(&str, &str)]) -> Result<Url> {
    let mut u = Url::parse(base).with_context(|| format!("bad control-plane url: {base}"))?;
    u.query_pairs_mut().extend_pairs(params.iter().copied());
    Ok(u)
}

/// Reads retry with jittered backoff; node health is re-fetched constantly,
/// so a transient failure should not surface to the operator.
async fn get_json_retrying<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
) -> Result<T> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 1..=READ_ATTEMPTS {
        match client.get(url.clone()).send().await {
            Ok(rsp) if rsp.status().is_success() => {
                return rsp
                    .json::<T>()
                    .await
                    .context("control plane returned malformed JSON");
            }
            Ok(rsp) => {
                last_err = Some(anyhow!("control plane returned {} for {}", rsp.status(), url));
            }
            Err(e) => {
                last_err = Some(anyhow::Error::new(e).context("control plane request failed"));
            }
        }
        if attempt < READ_ATTEMPTS {
            tracing::warn!(%url, attempt, "control-plane read failed, backing off");
            let backoff = rng().random_range(200..600);
            sleep(Duration::from_millis(backoff)).await;
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("control plane read failed")))
}

// -------------------------
// REST backend
// -------------------------

/// Talks to the backend API (`/api/v1` style). List responses arrive in an
/// `{items}` envelope.
pub struct RestControl {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl RestControl {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("API token is not a valid header value")?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn nodes_url(&self) -> String {
        format!("{}/nodes", self.base_url)
    }

    fn commands_url(&self, node_id: i64) -> String {
        format!("{}/nodes/{}/commands", self.base_url, node_id)
    }

    fn logs_url(&self, job_id: &str, after_id: Option<i64>) -> Result<Url> {
        let after = after_id.map(|id| id.to_string());
        let mut params = vec![("job_id", job_id)];
        if let Some(ref after) = after {
            params.push(("after_id", after));
        }
        with_params(&format!("{}/crawl-logs", self.base_url), &params)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        let url = Url::parse(&self.nodes_url()).context("bad nodes url")?;
        let body: Items<NodeSnapshot> = get_json_retrying(&self.client, url).await?;
        Ok(body.items)
    }

    async fn create_command(
        &self,
        node_id: i64,
        kind: CommandKind,
        payload: serde_json::Value,
    ) -> Result<NodeCommandRow> {
        let rsp = self
            .client
            .post(self.commands_url(node_id))
            .json(&CommandInsert::new(node_id, kind, payload))
            .send()
            .await
            .context("command dispatch failed")?;
        if !rsp.status().is_success() {
            return Err(anyhow!("command dispatch rejected: {}", rsp.status()));
        }
        rsp.json().await.context("command response was malformed")
    }

    async fn logs_since(&self, job_id: &str, after_id: Option<i64>) -> Result<Vec<CrawlLogRow>> {
        let body: Items<CrawlLogRow> =
            get_json_retrying(&self.client, self.logs_url(job_id, after_id)?).await?;
        Ok(body.items)
    }
}

// -------------------------
// Supabase (PostgREST) backend
// -------------------------

/// Talks straight to PostgREST with a service key. Inserts use
/// `Prefer: return=representation` to get the stored row back.
pub struct SupabaseControl {
    client: reqwest::Client,
    base_url: String,
}

impl SupabaseControl {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let key = HeaderValue::from_str(service_key)
            .context("Supabase key is not a valid header value")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .context("Supabase key is not a valid header value")?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), key);
        headers.insert(AUTHORIZATION, bearer);
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn nodes_url(&self) -> Result<Url> {
        with_params(
            &self.table_url("runtime_nodes"),
            &[("select", NODE_COLUMNS), ("order", "last_seen.desc")],
        )
    }

    fn logs_url(&self, job_id: &str, after_id: Option<i64>) -> Result<Url> {
        let job_filter = format!("eq.{job_id}");
        let mut params = vec![
            ("select", "*"),
            ("job_id", job_filter.as_str()),
            ("order", "id.asc"),
        ];
        let cursor = after_id.map(|id| format!("gt.{id}"));
        if let Some(ref cursor) = cursor {
            params.push(("id", cursor));
        }
        with_params(&self.table_url("crawl_logs"), &params)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        get_json_retrying(&self.client, self.nodes_url()?).await
    }

    async fn create_command(
        &self,
        node_id: i64,
        kind: CommandKind,
        payload: serde_json::Value,
    ) -> Result<NodeCommandRow> {
        let rsp = self
            .client
            .post(self.table_url("node_commands"))
            .header("Prefer", "return=representation")
            .json(&[CommandInsert::new(node_id, kind, payload)])
            .send()
            .await
            .context("command dispatch failed")?;
        if !rsp.status().is_success() {
            return Err(anyhow!("command dispatch rejected: {}", rsp.status()));
        }
        let rows: Vec<NodeCommandRow> =
            rsp.json().await.context("command response was malformed")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("control plane returned no command row"))
    }

    async fn logs_since(&self, job_id: &str, after_id: Option<i64>) -> Result<Vec<CrawlLogRow>> {
        get_json_retrying(&self.client, self.logs_url(job_id, after_id)?).await
    }
}

// -------------------------
// Tests
// -------------------------
