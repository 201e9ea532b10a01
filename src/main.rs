mod config;
mod control;
mod dashboard;
mod jobs;
mod logs;
mod nodes;
mod steps;

use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, web};
use anyhow::{Context, Result, bail};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use url::Url;

use config::Config;
use control::ControlPlane;
use jobs::{CodegenPayload, CommandKind, NodeCommandRow, TestCrawlPayload, TestStepsPayload};
use logs::LogLevel;
use nodes::NodeSnapshot;
use steps::Dialect;

struct AppState {
    control: ControlPlane,
    poll_interval: Duration,
    stream_cap: Duration,
}

// -------------------------
// Request / Response Types
// -------------------------

#[derive(Deserialize)]
struct ConvertReq {
    script: String,
    dialect: Dialect,
}

#[derive(Serialize)]
struct NodesResponse {
    count: usize,
    nodes: Vec<NodeSnapshot>,
}

#[derive(Deserialize)]
struct TestJobReq {
    url: String,
    node_id: Option<i64>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
}

#[derive(Deserialize)]
struct StepsJobReq {
    url: String,
    node_id: Option<i64>,
    script: String,
    dialect: Dialect,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
}

#[derive(Deserialize)]
struct CodegenJobReq {
    url: String,
    node_id: Option<i64>,
    target: Option<Dialect>,
    duration_sec: Option<u64>,
}

#[derive(Serialize)]
struct DispatchResponse {
    job_id: String,
    node_id: i64,
    command: NodeCommandRow,
}

fn error_json(e: &anyhow::Error) -> serde_json::Value {
    serde_json::json!({ "error": format!("{e:#}") })
}

fn bad_request(e: anyhow::Error) -> HttpResponse {
    HttpResponse::BadRequest().json(error_json(&e))
}

fn bad_gateway(e: anyhow::Error) -> HttpResponse {
    HttpResponse::BadGateway().json(error_json(&e))
}

// -------------------------
// HTTP Handlers
// -------------------------

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body(
        "Perch online.\n\
         JSON:\n  POST /convert {\"script\":\"await page.goto('https://example.com')\",\"dialect\":\"javascript\"}\n  GET  /nodes (ranked best-first)\n  POST /jobs/test {\"url\":\"https://example.com\"}\n  POST /jobs/steps {\"url\":\"...\",\"script\":\"...\",\"dialect\":\"python\"}\n  POST /jobs/codegen {\"url\":\"...\",\"target\":\"python\"}\n\
         Stream:\n  GET  /jobs/{job_id}/stream (SSE)\n\
         UI:\n  GET  /dashboard",
    )
}

#[get("/healthz")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[post("/convert")]
async fn convert(body: web::Json<ConvertReq>) -> impl Responder {
    let converted = steps::parse_script(&body.script, body.dialect);
    tracing::debug!(
        matched = converted.report.matched_lines,
        skipped = converted.report.skipped_lines,
        "script converted"
    );
    HttpResponse::Ok().json(converted)
}

#[get("/nodes")]
async fn list_nodes(state: web::Data<AppState>) -> impl Responder {
    match state.control.list_nodes().await {
        Ok(snapshot) => {
            let ranked = nodes::rank_nodes(&snapshot);
            HttpResponse::Ok().json(NodesResponse { count: ranked.len(), nodes: ranked })
        }
        Err(e) => bad_gateway(e),
    }
}

#[post("/jobs/test")]
async fn start_test(state: web::Data<AppState>, body: web::Json<TestJobReq>) -> impl Responder {
    if let Err(e) = validate_target_url(&body.url) {
        return bad_request(e);
    }
    let node_id = match resolve_node(&state, body.node_id).await {
        Ok(id) => id,
        Err(e) => return bad_gateway(e),
    };
    let job_id = jobs::new_job_id();
    let payload = TestCrawlPayload {
        url: body.url.clone(),
        job_id: job_id.clone(),
        timeout_ms: body.timeout_ms,
        retries: body.retries,
    };
    dispatch(&state, node_id, CommandKind::TestCrawl, &payload, job_id).await
}

#[post("/jobs/steps")]
async fn start_steps(state: web::Data<AppState>, body: web::Json<StepsJobReq>) -> impl Responder {
    if let Err(e) = validate_target_url(&body.url) {
        return bad_request(e);
    }
    let converted = steps::parse_script(&body.script, body.dialect);
    if converted.steps.is_empty() {
        // Nothing replayable; echo the report so the operator sees why.
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "script produced no steps",
            "report": converted.report,
        }));
    }
    let node_id = match resolve_node(&state, body.node_id).await {
        Ok(id) => id,
        Err(e) => return bad_gateway(e),
    };
    let job_id = jobs::new_job_id();
    let payload = TestStepsPayload {
        url: body.url.clone(),
        job_id: job_id.clone(),
        steps: converted.steps,
        timeout_ms: body.timeout_ms,
        retries: body.retries,
    };
    dispatch(&state, node_id, CommandKind::TestSteps, &payload, job_id).await
}

#[post("/jobs/codegen")]
async fn start_codegen(
    state: web::Data<AppState>,
    body: web::Json<CodegenJobReq>,
) -> impl Responder {
    if let Err(e) = validate_target_url(&body.url) {
        return bad_request(e);
    }
    let node_id = match resolve_node(&state, body.node_id).await {
        Ok(id) => id,
        Err(e) => return bad_gateway(e),
    };
    let job_id = jobs::new_job_id();
    let payload = CodegenPayload {
        url: body.url.clone(),
        job_id: job_id.clone(),
        target: body.target.unwrap_or(Dialect::Python),
        duration_sec: body.duration_sec.unwrap_or(jobs::DEFAULT_CODEGEN_DURATION_SEC),
    };
    dispatch(&state, node_id, CommandKind::Codegen, &payload, job_id).await
}

// -------------------------
// Dispatch helpers
// -------------------------

fn validate_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).context("invalid url")?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported scheme: {}", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("url has no host");
    }
    Ok(url)
}

/// An explicit node id wins; otherwise auto-assign the best node from a fresh
/// registry snapshot.
async fn resolve_node(state: &AppState, node_id: Option<i64>) -> Result<i64> {
    if let Some(id) = node_id {
        return Ok(id);
    }
    let snapshot = state.control.list_nodes().await?;
    let best = nodes::pick_node(&snapshot).context("no runtime nodes registered")?;
    tracing::info!(node_id = best.id, node = %best.name, "auto-assigned node");
    Ok(best.id)
}

async fn dispatch<T: Serialize>(
    state: &AppState,
    node_id: i64,
    kind: CommandKind,
    payload: &T,
    job_id: String,
) -> HttpResponse {
    let value = match serde_json::to_value(payload) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": e.to_string() }));
        }
    };
    match state.control.create_command(node_id, kind, value).await {
        Ok(command) => {
            tracing::info!(%job_id, node_id, ?kind, "job dispatched");
            HttpResponse::Ok().json(DispatchResponse { job_id, node_id, command })
        }
        Err(e) => bad_gateway(e),
    }
}

// --------------
// SSE streaming
// --------------

fn sse_event(event: &str, data_json: &str) -> Bytes {
    let payload = format!("event: {}\ndata: {}\n\n", event, data_json);
    Bytes::from(payload)
}

#[get("/jobs/{job_id}/stream")]
async fn job_stream(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let job_id = path.into_inner();
    let (tx, mut rx) = mpsc::channel::<Bytes>(32);

    actix_web::rt::spawn(async move {
        let started = Instant::now();
        let mut cursor: Option<i64> = None;

        let _ = tx
            .send(sse_event("start", &serde_json::json!({ "job_id": job_id }).to_string()))
            .await;

        'poll: loop {
            if started.elapsed() > state.stream_cap {
                let _ = tx
                    .send(sse_event(
                        "done",
                        &serde_json::json!({ "job_id": job_id, "reason": "timeout" }).to_string(),
                    ))
                    .await;
                break;
            }

            let rows = match state.control.logs_since(&job_id, cursor).await {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = tx.send(sse_event("error", &error_json(&e).to_string())).await;
                    break;
                }
            };

            for row in rows {
                if let Some(id) = row.id {
                    cursor = Some(cursor.map_or(id, |c| c.max(id)));
                }
                match row.level {
                    LogLevel::Result => {
                        let parsed = logs::first_result(std::slice::from_ref(&row));
                        let _ = tx
                            .send(sse_event(
                                "result",
                                &serde_json::json!({ "row": row, "parsed": parsed }).to_string(),
                            ))
                            .await;
                        let _ = tx
                            .send(sse_event(
                                "done",
                                &serde_json::json!({ "job_id": job_id, "reason": "result" })
                                    .to_string(),
                            ))
                            .await;
                        break 'poll;
                    }
                    LogLevel::Artifact => {
                        let artifact = logs::parse_artifact(&row);
                        let replay = (artifact.kind == "trace")
                            .then(|| logs::trace_replay_url(&artifact.url));
                        let _ = tx
                            .send(sse_event(
                                "artifact",
                                &serde_json::json!({ "artifact": artifact, "replay_url": replay })
                                    .to_string(),
                            ))
                            .await;
                    }
                    _ => {
                        let _ = tx
                            .send(sse_event(
                                "log",
                                &serde_json::to_string(&row).unwrap_or_default(),
                            ))
                            .await;
                    }
                }
            }

            sleep(state.poll_interval).await;
        }
    });

    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, actix_web::Error>(chunk);
        }
    };

    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/event-stream"))
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(stream)
}

// -------------------------
// Tiny HTML dashboard
// -------------------------

#[get("/dashboard")]
async fn dashboard_page() -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/html; charset=utf-8"))
        .body(dashboard::PAGE)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let control = ControlPlane::from_config(&config.control)?;
    tracing::info!(
        bind = %config.bind_addr,
        backend = control.backend_name(),
        "starting Perch"
    );

    let state = web::Data::new(AppState {
        control,
        poll_interval: config.poll_interval,
        stream_cap: config.stream_cap,
    });
    let bind_addr = config.bind_addr.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(index)
            .service(healthz)
            .service(convert)
            .service(list_nodes)
            .service(start_test)
            .service(start_steps)
            .service(start_codegen)
            .service(job_stream) // SSE stream
            .service(dashboard_page) // Minimal UI
    })
    .bind(bind_addr.as_str())?
    .run()
    .await?;
    Ok(())
}

// -------------------------
// Tests
// -------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_validation() {
        assert!(validate_target_url("https://example.com/p/1").is_ok());
        assert!(validate_target_url("http://shop.example").is_ok());
        assert!(validate_target_url("ftp://example.com").is_err());
        assert!(validate_target_url("not a url").is_err());
        assert!(validate_target_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn sse_event_framing() {
        let chunk = sse_event("log", r#"{"level":"info"}"#);
        assert_eq!(&chunk[..], b"event: log\ndata: {\"level\":\"info\"}\n\n");
    }
}
