use serde::{Deserialize, Serialize};

// -------------------------
// Crawl log rows
// -------------------------

/// Log level written by runtime nodes. `result` and `artifact` rows carry
/// JSON payloads in `message`; everything else is operator-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Result,
    Artifact,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLogRow {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub job_id: String,
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

// -------------------------
// Result / artifact extraction
// -------------------------

/// Final crawl outcome a node reports in its `result` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A replay artifact (trace, screenshot, ...) a node uploaded for the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// The first `result` row's message, parsed. An unparseable result is treated
/// as absent rather than an error: the raw row is still on the stream.
pub fn first_result(rows: &[CrawlLogRow]) -> Option<CrawlResult> {
    rows.iter()
        .find(|r| r.level == LogLevel::Result)
        .and_then(|r| serde_json::from_str(&r.message).ok())
}

pub fn parse_artifact(row: &CrawlLogRow) -> Artifact {
    match serde_json::from_str::<ArtifactMessage>(&row.message) {
        Ok(msg) => Artifact {
            kind: msg.kind.unwrap_or_else(|| "unknown".to_string()),
            url: msg.url.unwrap_or_default(),
            created_at: row.created_at.clone(),
        },
        // Nodes occasionally log a bare URL; keep it visible.
        Err(_) => Artifact {
            kind: "unknown".to_string(),
            url: row.message.clone(),
            created_at: row.created_at.clone(),
        },
    }
}

pub fn artifacts(rows: &[CrawlLogRow]) -> Vec<Artifact> {
    rows.iter()
        .filter(|r| r.level == LogLevel::Artifact)
        .map(parse_artifact)
        .collect()
}

/// Replay link for a Playwright trace artifact.
pub fn trace_replay_url(artifact_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(artifact_url.as_bytes()).collect();
    format!("https://trace.playwright.dev/?trace={encoded}")
}

// -------------------------
// Tests
// -------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: LogLevel, message: &str) -> CrawlLogRow {
        CrawlLogRow {
            id: Some(1),
            job_id: "1_abc".into(),
            level,
            message: message.into(),
            created_at: Some("2026-08-30T10:00:00Z".into()),
        }
    }

    #[test]
    fn first_result_parses_price_and_url() {
        let rows = vec![
            row(LogLevel::Info, "starting"),
            row(LogLevel::Result, r#"{"price": 1999.0, "url": "https://shop.example/p/1"}"#),
            row(LogLevel::Result, r#"{"price": 1.0}"#),
        ];
        let result = first_result(&rows).unwrap();
        assert_eq!(result.price, Some(1999.0));
        assert_eq!(result.url.as_deref(), Some("https://shop.example/p/1"));
    }

    #[test]
    fn malformed_result_is_none() {
        let rows = vec![row(LogLevel::Result, "not json")];
        assert!(first_result(&rows).is_none());
        assert!(first_result(&[]).is_none());
    }

    #[test]
    fn artifacts_fall_back_to_unknown() {
        let rows = vec![
            row(LogLevel::Artifact, r#"{"type": "trace", "url": "https://cdn.example/t.zip"}"#),
            row(LogLevel::Artifact, "https://cdn.example/raw.png"),
            row(LogLevel::Info, "ignored"),
        ];
        let found = artifacts(&rows);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, "trace");
        assert_eq!(found[0].url, "https://cdn.example/t.zip");
        assert_eq!(found[1].kind, "unknown");
        assert_eq!(found[1].url, "https://cdn.example/raw.png");
        assert_eq!(found[0].created_at.as_deref(), Some("2026-08-30T10:00:00Z"));
    }

    #[test]
    fn trace_replay_url_is_encoded() {
        let link = trace_replay_url("https://cdn.example/t.zip?sig=a b&x=1");
        assert!(link.starts_with("https://trace.playwright.dev/?trace=https%3A%2F%2F"));
        assert!(!link.contains(' '));
        assert!(!link.contains("&x"));
    }

    #[test]
    fn unknown_level_deserializes() {
        let parsed: CrawlLogRow = serde_json::from_value(serde_json::json!({
            "job_id": "1_abc",
            "level": "debug",
            "message": "m"
        }))
        .unwrap();
        assert_eq!(parsed.level, LogLevel::Other);
    }
}
