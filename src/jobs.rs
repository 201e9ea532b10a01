use crate::steps::{Dialect, Step};
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// -------------------------
// Node commands
// -------------------------

/// Commands perch writes into the control plane's `node_commands` table for a
/// runtime node to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    TestCrawl,
    TestSteps,
    Codegen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A command row as echoed back by the control plane after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCommandRow {
    #[serde(default)]
    pub id: Option<i64>,
    pub node_id: i64,
    pub command: CommandKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

// -------------------------
// Dispatch payloads
// -------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCrawlPayload {
    pub url: String,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStepsPayload {
    pub url: String,
    pub job_id: String,
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

pub const DEFAULT_CODEGEN_DURATION_SEC: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenPayload {
    pub url: String,
    pub job_id: String,
    pub target: Dialect,
    pub duration_sec: u64,
}

// -------------------------
// Ids and timestamps
// -------------------------

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Job ids are `<unix-millis>_<11 base36 chars>`: sortable by creation time,
/// collision-proof enough for a log-correlation key.
pub fn new_job_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut r = rng();
    let suffix: String = (0..11)
        .map(|_| BASE36[r.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{millis}_{suffix}")
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

// -------------------------
// Tests
// -------------------------
