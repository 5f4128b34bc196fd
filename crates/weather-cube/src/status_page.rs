//! Read-only status page over HTTP.
//!
//! - `GET /` human-readable page, refreshes itself every 30 seconds
//! - `GET /status` JSON snapshot
//! - `GET /health` liveness probe

use axum::{extract::State, response::Html, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::sync::watch;

use crate::color::Rgb;
use crate::error::StatusPageError;
use crate::snapshot::{LoopPhase, SnapshotReader, StatusSnapshot};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub snapshot: SnapshotReader,
}

/// JSON response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: &'static str,
    pub state: &'static str,
    pub updated: String,
    pub temperature_celsius: Option<f64>,
    pub condition: Option<String>,
    pub primary_color: Option<String>,
    pub primary_rgb: Option<Rgb>,
}

fn phase_to_string(phase: LoopPhase) -> &'static str {
    match phase {
        LoopPhase::Idle => "idle",
        LoopPhase::Active => "active",
        LoopPhase::Quiet => "quiet",
    }
}

impl From<&StatusSnapshot> for StatusResponse {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            phase: phase_to_string(snapshot.phase),
            state: snapshot.phase.describe(),
            updated: snapshot.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            temperature_celsius: snapshot.temperature_celsius,
            condition: snapshot.condition.clone(),
            primary_color: snapshot.primary_color.map(|c| c.to_hex()),
            primary_rgb: snapshot.primary_color,
        }
    }
}

/// GET / - Status page
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.snapshot.current()))
}

/// GET /status - Current snapshot as JSON
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from(&state.snapshot.current()))
}

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_page(snapshot: &StatusSnapshot) -> String {
    let temperature = snapshot
        .temperature_celsius
        .map(|t| format!("{:.2}°C", t))
        .unwrap_or_else(|| "-".to_string());
    let condition = snapshot
        .condition
        .as_deref()
        .map(escape_html)
        .unwrap_or_else(|| "-".to_string());
    let color = match snapshot.primary_color {
        Some(c) => format!(
            r#"<td style="display: flex; gap: 10px; color: rgb({}, {}, {})">{} ({})</td>"#,
            c.r,
            c.g,
            c.b,
            c.to_hex(),
            c
        ),
        None => "<td>-</td>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>Weather Cube</title>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="30">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/water.css@2/out/water.css">
  </head>
  <body>
    <main>
      <h1>Weather Cube</h1>
      <table>
        <tbody>
          <tr><td>State</td><td>{state}</td></tr>
          <tr><td>Updated</td><td>{updated}</td></tr>
          <tr><td>Temperature</td><td>{temperature}</td></tr>
          <tr><td>Condition</td><td>{condition}</td></tr>
          <tr><td>Color</td>{color}</tr>
        </tbody>
      </table>
    </main>
  </body>
</html>
"#,
        state = snapshot.phase.describe(),
        updated = snapshot.updated_at.format(TIMESTAMP_FORMAT),
        temperature = temperature,
        condition = condition,
        color = color,
    )
}

/// Create the HTTP router
pub fn create_router(snapshot: SnapshotReader) -> Router {
    let state = AppState { snapshot };

    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serve the status page until `shutdown` fires.
pub async fn run_status_server(
    snapshot: SnapshotReader,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), StatusPageError> {
    let app = create_router(snapshot);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StatusPageError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    log::info!("[Status] Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    log::info!("[Status] Stopped");
    Ok(())
}
